//! flow - PeerDB Flows 角色实现
//!
//! 命令行、编排服务客户端、活动 worker 与 API 服务

pub mod api;
pub mod cli;
pub mod entry;
pub mod temporal;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cli::{Cli, Command};
pub use entry::DefaultEntryPoints;
