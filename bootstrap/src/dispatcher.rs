//! 角色分发
//!
//! 按角色名称选择入口函数，运行其工作单元直到完成或取消，
//! 并保证编排客户端在任何退出路径上都会被关闭（包括 panic）。

use std::sync::Arc;

use async_trait::async_trait;
use flow_config::{ApiServerParams, Role, RoleConfig, SnapshotWorkerOptions, WorkerOptions};
use flow_errors::{AppError, AppResult, ErrorKind};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::diagnostics::TaskRegistry;
use crate::metrics::record_role_start;
use crate::shutdown::ServiceLifecycle;

/// 编排服务客户端句柄
pub trait OrchestrationClient: Send + Sync {
    /// 释放连接，允许重复调用
    fn close(&self);
}

/// 角色的工作单元
#[async_trait]
pub trait Runnable: Send {
    /// 运行直到完成，或 `interrupt` 被取消后返回
    async fn run(self: Box<Self>, interrupt: CancellationToken) -> AppResult<()>;
}

/// 入口函数返回的客户端与工作单元
pub struct RoleHandles {
    pub client: Box<dyn OrchestrationClient>,
    pub unit: Box<dyn Runnable>,
}

impl RoleHandles {
    pub fn new(client: impl OrchestrationClient + 'static, unit: impl Runnable + 'static) -> Self {
        Self {
            client: Box::new(client),
            unit: Box::new(unit),
        }
    }
}

/// 三个角色的入口函数
#[async_trait]
pub trait EntryPoints: Send + Sync + 'static {
    async fn worker_main(&self, opts: WorkerOptions) -> AppResult<RoleHandles>;

    async fn snapshot_worker_main(&self, opts: SnapshotWorkerOptions) -> AppResult<RoleHandles>;

    /// 启动 API 服务并阻塞到 `shutdown` 被取消
    async fn api_main(&self, shutdown: CancellationToken, params: ApiServerParams) -> AppResult<()>;
}

/// drop 时关闭客户端，覆盖正常返回、错误与 panic
pub struct ClientGuard {
    role: Role,
    client: Box<dyn OrchestrationClient>,
}

impl ClientGuard {
    pub fn new(role: Role, client: impl OrchestrationClient + 'static) -> Self {
        Self::boxed(role, Box::new(client))
    }

    fn boxed(role: Role, client: Box<dyn OrchestrationClient>) -> Self {
        Self { role, client }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        info!(role = %self.role, "Closing orchestration client");
        self.client.close();
    }
}

/// 角色分发器
pub struct RoleDispatcher<E> {
    entry_points: Arc<E>,
    registry: TaskRegistry,
    lifecycle: Option<ServiceLifecycle>,
}

impl<E: EntryPoints> RoleDispatcher<E> {
    pub fn new(entry_points: Arc<E>, registry: TaskRegistry) -> Self {
        Self {
            entry_points,
            registry,
            lifecycle: None,
        }
    }

    /// 角色启动成功后把生命周期推进到 Running
    pub fn with_lifecycle(mut self, lifecycle: ServiceLifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// 分发并运行一个角色
    ///
    /// 角色名称与配置在构造任何资源之前校验。
    pub async fn dispatch(
        &self,
        role: &str,
        config: RoleConfig,
        token: CancellationToken,
    ) -> AppResult<()> {
        let role: Role = role.parse()?;
        if config.role() != role {
            return Err(AppError::configuration(format!(
                "role '{role}' was given configuration for '{}'",
                config.role()
            )));
        }
        validate(&config)?;

        record_role_start(role.as_str());
        info!(
            role = %role,
            temporal_host_port = %config.temporal().host_port,
            namespace = %config.temporal().namespace,
            "Starting role"
        );

        match config {
            RoleConfig::Worker(opts) => {
                let handles = self
                    .entry_points
                    .worker_main(opts)
                    .await
                    .map_err(|e| bootstrap_error(role, e))?;
                self.run_unit(role, handles, token).await
            }
            RoleConfig::SnapshotWorker(opts) => {
                let handles = self
                    .entry_points
                    .snapshot_worker_main(opts)
                    .await
                    .map_err(|e| bootstrap_error(role, e))?;
                self.run_unit(role, handles, token).await
            }
            RoleConfig::Api(params) => {
                let entry_points = self.entry_points.clone();
                let interrupt = token.clone();
                let handle = self.registry.spawn(role.as_str(), &interrupt, async move {
                    entry_points.api_main(token, params).await
                });
                self.mark_running();
                match handle.await {
                    // 服务启动前的失败仍属于引导阶段
                    Ok(Err(e)) if e.kind() != ErrorKind::Runnable => Err(bootstrap_error(role, e)),
                    joined => flatten(role, joined),
                }
            }
        }
    }

    async fn run_unit(
        &self,
        role: Role,
        handles: RoleHandles,
        token: CancellationToken,
    ) -> AppResult<()> {
        let RoleHandles { client, unit } = handles;
        let _client = ClientGuard::boxed(role, client);

        let handle = self
            .registry
            .spawn(role.as_str(), &token, unit.run(token.clone()));
        self.mark_running();
        let result = flatten(role, handle.await);

        match &result {
            Ok(()) => info!(role = %role, "Role finished"),
            Err(e) => error!(role = %role, error = %e, "Role terminated with error"),
        }
        result
    }

    fn mark_running(&self) {
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.mark_running();
        }
    }
}

fn validate(config: &RoleConfig) -> AppResult<()> {
    match config {
        RoleConfig::Worker(opts) => opts.validate()?,
        RoleConfig::Api(params) => params.validate()?,
        RoleConfig::SnapshotWorker(_) => {}
    }
    Ok(())
}

fn bootstrap_error(role: Role, err: AppError) -> AppError {
    match err.kind() {
        ErrorKind::Configuration | ErrorKind::RoleBootstrap => err,
        _ => AppError::role_bootstrap(role.as_str(), err),
    }
}

fn flatten(role: Role, joined: Result<AppResult<()>, JoinError>) -> AppResult<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.kind() == ErrorKind::Runnable => Err(e),
        Ok(Err(e)) => Err(AppError::runnable(format!("{role}: {e}"))),
        Err(e) if e.is_panic() => Err(AppError::runnable(format!("{role} panicked"))),
        Err(_) => Err(AppError::runnable(format!("{role} was cancelled"))),
    }
}
