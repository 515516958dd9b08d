//! 编排服务客户端

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use flow_bootstrap::OrchestrationClient;
use flow_config::TemporalSettings;
use flow_errors::{AppError, AppResult};
use tokio::net::TcpStream;
use tracing::info;

/// 连接超时
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 编排服务连接
pub struct TemporalClient {
    settings: TemporalSettings,
    stream: Mutex<Option<TcpStream>>,
}

impl TemporalClient {
    /// 连接编排服务端点
    pub async fn connect(settings: TemporalSettings) -> AppResult<Self> {
        Self::connect_with_timeout(settings, CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        settings: TemporalSettings,
        timeout: Duration,
    ) -> AppResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(&settings.host_port))
            .await
            .map_err(|_| {
                AppError::resource_construction(
                    "temporal client",
                    format!("connect to {} timed out after {:?}", settings.host_port, timeout),
                )
            })?
            .map_err(|e| {
                AppError::resource_construction(
                    "temporal client",
                    format!("connect to {}: {}", settings.host_port, e),
                )
            })?;

        info!(
            host_port = %settings.host_port,
            namespace = %settings.namespace,
            tls = settings.tls.is_some(),
            "Connected to orchestration endpoint"
        );

        Ok(Self {
            settings,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn settings(&self) -> &TemporalSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl OrchestrationClient for TemporalClient {
    fn close(&self) {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if stream.is_some() {
            info!(host_port = %self.settings.host_port, "Orchestration client closed");
        }
    }
}
