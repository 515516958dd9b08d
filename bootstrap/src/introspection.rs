//! 诊断 HTTP 服务
//!
//! 仅监听回环地址，提供 /health、/debug/tasks、/debug/runtime 和 /metrics 端点。
//! 绑定或服务失败只记录日志，不影响角色运行。

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::diagnostics::{RuntimeSnapshot, TaskRegistry};
use crate::metrics::MetricsRecorder;
use crate::shutdown::ServiceLifecycle;

/// 默认诊断地址
pub const DEFAULT_INTROSPECTION_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 6060);

/// 存活状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub lifecycle: String,
    pub tracked_units: usize,
}

#[derive(Clone)]
struct IntrospectionState {
    lifecycle: ServiceLifecycle,
    registry: TaskRegistry,
    metrics: MetricsRecorder,
}

/// 诊断 HTTP 服务器
pub struct IntrospectionServer {
    state: IntrospectionState,
    addr: SocketAddr,
}

impl IntrospectionServer {
    pub fn new(lifecycle: ServiceLifecycle, registry: TaskRegistry, metrics: MetricsRecorder) -> Self {
        Self {
            state: IntrospectionState {
                lifecycle,
                registry,
                metrics,
            },
            addr: DEFAULT_INTROSPECTION_ADDR,
        }
    }

    /// 覆盖监听地址
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/debug/tasks", get(tasks_handler))
            .route("/debug/runtime", get(runtime_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    /// 启动 HTTP 服务器
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Introspection server listening");
        axum::serve(listener, app).await
    }

    /// 后台启动，失败只记录日志
    pub fn spawn(self) -> JoinHandle<()> {
        let addr = self.addr;
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                error!(%addr, error = %e, "Introspection server error");
            }
        })
    }
}

async fn health_handler(State(state): State<IntrospectionState>) -> impl IntoResponse {
    let status = HealthStatus {
        status: "healthy".to_string(),
        lifecycle: state.lifecycle.state().to_string(),
        tracked_units: state.registry.len(),
    };
    (StatusCode::OK, Json(status))
}

async fn tasks_handler(State(state): State<IntrospectionState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        state.registry.render_units(),
    )
}

async fn runtime_handler() -> impl IntoResponse {
    match RuntimeSnapshot::capture() {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn metrics_handler(State(state): State<IntrospectionState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
