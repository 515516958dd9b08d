//! flow-bootstrap - 统一进程启动骨架
//!
//! 生命周期、信号处理、诊断与角色分发

mod diagnostics;
mod dispatcher;
mod introspection;
mod metrics;
mod runtime;
mod shutdown;
mod starter;

pub use diagnostics::*;
pub use dispatcher::*;
pub use introspection::*;
pub use metrics::*;
pub use runtime::*;
pub use shutdown::*;
pub use starter::*;
