//! API 角色
//!
//! gRPC 服务（仅反射服务）监听 `port`，HTTP 网关监听 `gateway_port`。
//! 两者共享同一个取消令牌，任一方异常退出时另一方随之停止。

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use flow_adapter_postgres::{CatalogPool, PoolConnector};
use flow_config::ApiServerParams;
use flow_errors::{AppError, AppResult};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GatewayStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }
}

/// HTTP 网关路由
pub fn gateway_router<C: PoolConnector>(catalog: Arc<CatalogPool<C>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler::<C>))
        .with_state(catalog)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(GatewayStatus::healthy()))
}

/// 就绪 = 目录库可用
async fn ready_handler<C: PoolConnector>(
    State(catalog): State<Arc<CatalogPool<C>>>,
) -> impl IntoResponse {
    match catalog.acquire().await {
        Ok(_) => (StatusCode::OK, Json(GatewayStatus::healthy())),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(GatewayStatus::unhealthy(e.to_string())),
        ),
    }
}

/// 启动 gRPC 服务与 HTTP 网关，阻塞到 `shutdown` 被取消
pub async fn serve<C: PoolConnector>(
    params: &ApiServerParams,
    catalog: Arc<CatalogPool<C>>,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], params.port));
    let gateway_addr = SocketAddr::from(([0, 0, 0, 0], params.gateway_port));

    let reflection = tonic_reflection::server::Builder::configure()
        .build_v1()
        .map_err(|e| AppError::role_bootstrap("api", format!("reflection service: {e}")))?;

    let grpc_listener = TcpListener::bind(grpc_addr)
        .await
        .map_err(|e| AppError::role_bootstrap("api", format!("bind {grpc_addr}: {e}")))?;
    let gateway_listener = TcpListener::bind(gateway_addr)
        .await
        .map_err(|e| AppError::role_bootstrap("api", format!("bind {gateway_addr}: {e}")))?;

    // 任一服务退出时停止另一个
    let stop = shutdown.child_token();

    let grpc = {
        let stop = stop.clone();
        async move {
            info!(addr = %grpc_addr, "gRPC server starting");
            let incoming = TcpListenerStream::new(grpc_listener);
            let result = Server::builder()
                .add_service(reflection)
                .serve_with_incoming_shutdown(incoming, stop.clone().cancelled_owned())
                .await
                .map_err(|e| AppError::runnable(format!("grpc server: {e}")));
            if let Err(e) = &result {
                error!(error = %e, "gRPC server terminated");
            }
            stop.cancel();
            result
        }
    };

    let gateway = {
        let stop = stop.clone();
        let app = gateway_router(catalog);
        async move {
            info!(addr = %gateway_addr, "HTTP gateway starting");
            let result = axum::serve(gateway_listener, app)
                .with_graceful_shutdown(stop.clone().cancelled_owned())
                .await
                .map_err(|e| AppError::runnable(format!("gateway: {e}")));
            if let Err(e) = &result {
                error!(error = %e, "HTTP gateway terminated");
            }
            stop.cancel();
            result
        }
    };

    let (grpc_result, gateway_result) = tokio::join!(grpc, gateway);
    info!("API server stopped");
    grpc_result.and(gateway_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, catalog};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use flow_config::TemporalSettings;
    use flow_errors::ErrorKind;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn request(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_health_is_always_ok() {
        let connector = FakeConnector::default();
        connector.ping_fails.store(true, Ordering::SeqCst);

        let (status, body) = request(gateway_router(catalog(connector)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_follows_catalog_liveness() {
        let pool = catalog(FakeConnector::default());

        let (status, _) = request(gateway_router(pool.clone()), "/ready").await;
        assert_eq!(status, StatusCode::OK);

        let connector = FakeConnector::default();
        connector.ping_fails.store(true, Ordering::SeqCst);
        let (status, body) = request(gateway_router(catalog(connector)), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("unable to establish connection with catalog")
        );
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let params = ApiServerParams {
            port: free_port().await,
            gateway_port: free_port().await,
            temporal: TemporalSettings::default(),
        };
        let shutdown = CancellationToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                serve(&params, catalog(FakeConnector::default()), shutdown).await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("api stopped after shutdown")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_gateway_port_in_use_fails_bootstrap() {
        let occupied = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let params = ApiServerParams {
            port: free_port().await,
            gateway_port: occupied.local_addr().unwrap().port(),
            temporal: TemporalSettings::default(),
        };

        let err = serve(
            &params,
            catalog(FakeConnector::default()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RoleBootstrap);
        assert!(err.to_string().contains("bind"));
    }
}
