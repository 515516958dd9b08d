//! flow-adapter-postgres - PostgreSQL 适配器（目录库连接池）

mod catalog;
mod config;
mod connection;

pub use catalog::*;
pub use config::*;
pub use connection::*;
