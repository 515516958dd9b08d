//! 活动 worker
//!
//! 按并发上限持有活动槽位与工作流任务槽位，启动时获取目录库连接池，
//! 之后周期性探测目录库，直到中断令牌被取消。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flow_adapter_postgres::{CatalogPool, PgConnector, PoolConnector};
use flow_bootstrap::Runnable;
use flow_errors::{AppError, AppResult};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// worker 任务队列
pub const PEER_FLOW_TASK_QUEUE: &str = "peer-flow-task-queue";
/// snapshot-worker 任务队列
pub const SNAPSHOT_FLOW_TASK_QUEUE: &str = "snapshot-flow-task-queue";

/// 目录库探测间隔
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(30);

pub struct ActivityWorker<C: PoolConnector = PgConnector> {
    task_queue: &'static str,
    activity_slots: Arc<Semaphore>,
    workflow_task_slots: Arc<Semaphore>,
    catalog: Arc<CatalogPool<C>>,
    liveness_interval: Duration,
}

impl<C: PoolConnector> ActivityWorker<C> {
    pub fn new(
        task_queue: &'static str,
        max_concurrent_activities: usize,
        max_concurrent_workflow_tasks: usize,
        catalog: Arc<CatalogPool<C>>,
    ) -> Self {
        Self {
            task_queue,
            activity_slots: Arc::new(Semaphore::new(max_concurrent_activities)),
            workflow_task_slots: Arc::new(Semaphore::new(max_concurrent_workflow_tasks)),
            catalog,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
        }
    }

    /// snapshot-worker 串行处理
    pub fn snapshot(catalog: Arc<CatalogPool<C>>) -> Self {
        Self::new(SNAPSHOT_FLOW_TASK_QUEUE, 1, 1, catalog)
    }

    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    pub fn task_queue(&self) -> &'static str {
        self.task_queue
    }

    pub fn available_activity_slots(&self) -> usize {
        self.activity_slots.available_permits()
    }

    pub fn available_workflow_task_slots(&self) -> usize {
        self.workflow_task_slots.available_permits()
    }

    /// 占用一个活动槽位探测目录库
    async fn probe_catalog(&self) -> AppResult<()> {
        let _permit = self
            .activity_slots
            .acquire()
            .await
            .map_err(|e| AppError::runnable(format!("activity slots closed: {e}")))?;

        match self.catalog.acquire().await {
            Ok(_) => {
                debug!(task_queue = self.task_queue, "Catalog reachable");
                Ok(())
            }
            Err(e) if e.is_liveness() => {
                warn!(task_queue = self.task_queue, error = %e, "Catalog unreachable");
                Ok(())
            }
            Err(e) => Err(AppError::runnable(format!("catalog unavailable: {e}"))),
        }
    }
}

#[async_trait]
impl<C: PoolConnector> Runnable for ActivityWorker<C> {
    async fn run(self: Box<Self>, interrupt: CancellationToken) -> AppResult<()> {
        info!(
            task_queue = self.task_queue,
            max_concurrent_activities = self.available_activity_slots(),
            max_concurrent_workflow_tasks = self.available_workflow_task_slots(),
            "Worker started"
        );

        let mut ticker = tokio::time::interval(self.liveness_interval);

        // 第一次 tick 立即返回，即启动探测；探测本身也要能被中断
        loop {
            tokio::select! {
                _ = interrupt.cancelled() => break,
                result = async {
                    ticker.tick().await;
                    self.probe_catalog().await
                } => result?,
            }
        }

        self.activity_slots.close();
        self.workflow_task_slots.close();
        info!(task_queue = self.task_queue, "Worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, catalog};
    use flow_errors::ErrorKind;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_snapshot_worker_is_serial() {
        let worker = ActivityWorker::snapshot(catalog(FakeConnector::default()));
        assert_eq!(worker.task_queue(), SNAPSHOT_FLOW_TASK_QUEUE);
        assert_eq!(worker.available_activity_slots(), 1);
        assert_eq!(worker.available_workflow_task_slots(), 1);
    }

    #[tokio::test]
    async fn test_worker_probes_until_interrupted() {
        let pool = catalog(FakeConnector::default());
        let worker = ActivityWorker::new(PEER_FLOW_TASK_QUEUE, 4, 2, pool.clone())
            .with_liveness_interval(Duration::from_millis(5));
        let interrupt = CancellationToken::new();

        let handle = tokio::spawn(Box::new(worker).run(interrupt.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        interrupt.cancel();
        handle.await.unwrap().unwrap();
        assert!(pool.is_initialized().await);
    }

    #[tokio::test]
    async fn test_liveness_failure_is_not_fatal() {
        let connector = FakeConnector::default();
        connector.ping_fails.store(true, Ordering::SeqCst);
        let worker = ActivityWorker::new(PEER_FLOW_TASK_QUEUE, 1, 1, catalog(connector))
            .with_liveness_interval(Duration::from_millis(5));
        let interrupt = CancellationToken::new();

        let handle = tokio::spawn(Box::new(worker).run(interrupt.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        interrupt.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_during_slow_catalog_construction_stops_promptly() {
        let connector = FakeConnector {
            connect_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let pool = catalog(connector);
        let worker = ActivityWorker::new(PEER_FLOW_TASK_QUEUE, 1, 1, pool.clone());
        let interrupt = CancellationToken::new();

        let handle = tokio::spawn(Box::new(worker).run(interrupt.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        interrupt.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker stopped while catalog was connecting")
            .unwrap()
            .unwrap();
        assert!(!pool.is_initialized().await);
    }

    #[tokio::test]
    async fn test_catalog_construction_failure_stops_worker() {
        let connector = FakeConnector {
            connect_fails: true,
            ..Default::default()
        };
        let worker = ActivityWorker::new(PEER_FLOW_TASK_QUEUE, 1, 1, catalog(connector));

        let err = Box::new(worker)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runnable);
        assert!(err.to_string().contains("catalog unavailable"));
    }
}
