//! 默认入口函数

use std::sync::Arc;

use async_trait::async_trait;
use flow_adapter_postgres::{CatalogPool, PgConnector, PoolConnector};
use flow_bootstrap::{ClientGuard, EntryPoints, RoleHandles};
use flow_config::{ApiServerParams, Role, SnapshotWorkerOptions, WorkerOptions};
use flow_errors::AppResult;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api;
use crate::temporal::TemporalClient;
use crate::worker::{ActivityWorker, PEER_FLOW_TASK_QUEUE};

/// 共享同一个目录库连接池的入口函数
pub struct DefaultEntryPoints<C: PoolConnector = PgConnector> {
    catalog: Arc<CatalogPool<C>>,
}

impl DefaultEntryPoints {
    /// 使用进程级共享连接池
    pub fn global() -> Self {
        Self::new(CatalogPool::global())
    }
}

impl<C: PoolConnector> DefaultEntryPoints<C> {
    pub fn new(catalog: Arc<CatalogPool<C>>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl<C: PoolConnector> EntryPoints for DefaultEntryPoints<C> {
    async fn worker_main(&self, opts: WorkerOptions) -> AppResult<RoleHandles> {
        if opts.enable_profiling {
            // 未链接剖析 agent，只记录目标地址
            info!(pyroscope_server = %opts.pyroscope_server, "Profiling requested");
        }

        let client = TemporalClient::connect(opts.temporal).await?;
        let worker = ActivityWorker::new(
            PEER_FLOW_TASK_QUEUE,
            opts.max_concurrent_activities,
            opts.max_concurrent_workflow_tasks,
            self.catalog.clone(),
        );
        Ok(RoleHandles::new(client, worker))
    }

    async fn snapshot_worker_main(&self, opts: SnapshotWorkerOptions) -> AppResult<RoleHandles> {
        let client = TemporalClient::connect(opts.temporal).await?;
        let worker = ActivityWorker::snapshot(self.catalog.clone());
        Ok(RoleHandles::new(client, worker))
    }

    async fn api_main(&self, shutdown: CancellationToken, params: ApiServerParams) -> AppResult<()> {
        let client = TemporalClient::connect(params.temporal.clone()).await?;
        let _client = ClientGuard::new(Role::Api, client);
        api::serve(&params, self.catalog.clone(), shutdown).await
    }
}
