//! 服务运行时

use flow_config::TelemetryConfig;
use flow_telemetry::init_from_config;
use tracing::info;

/// 初始化服务运行时
pub fn init_runtime(config: &TelemetryConfig) {
    // 初始化 tracing
    init_from_config(config);

    info!(
        log_level = %config.level,
        log_format = ?config.format,
        "Runtime initialized"
    );
}

/// 关闭信号订阅（SIGINT / SIGTERM）
///
/// 订阅在 `install` 时立即注册，之后到达的信号不会丢失。
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// 注册信号订阅
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// 等待关闭信号，返回信号名称
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL_C",
            Err(_) => std::future::pending().await,
        }
    }
}
