//! 目录库连接池
//!
//! 进程内唯一的共享连接池：首次获取时惰性构造，每次获取都做一次存活探测。
//! 构造失败不会占用槽位，后续调用可以重新尝试；构造成功后不再重建。

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use flow_config::{CatalogConfigProvider, EnvCatalogConfigProvider};
use flow_errors::{AppError, AppResult};
use metrics::counter;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::PostgresConfig;
use crate::connection::{check_connection, create_pool};

/// 目录库连接的应用名称
pub const CATALOG_APPLICATION_NAME: &str = "peerdb-flow";

/// 连接池构造与探测
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    type Pool: Clone + Send + Sync + fmt::Debug + 'static;

    /// 构造连接池
    async fn connect(&self, config: &PostgresConfig) -> AppResult<Self::Pool>;

    /// 轻量往返探测
    async fn ping(&self, pool: &Self::Pool) -> AppResult<()>;
}

/// 基于 sqlx 的 PostgreSQL 连接器
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl PoolConnector for PgConnector {
    type Pool = PgPool;

    async fn connect(&self, config: &PostgresConfig) -> AppResult<PgPool> {
        create_pool(config).await
    }

    async fn ping(&self, pool: &PgPool) -> AppResult<()> {
        check_connection(pool).await
    }
}

/// 获取连接池失败
///
/// 存活探测失败时仍然携带已构造的连接池，由调用方决定是否继续使用。
#[derive(Debug, Error)]
pub enum AcquireError<P> {
    #[error(transparent)]
    Construction(AppError),

    #[error("unable to establish connection with catalog: {source}")]
    Liveness { pool: P, source: AppError },
}

impl<P> AcquireError<P> {
    /// 取回探测失败时的连接池
    pub fn into_pool(self) -> Option<P> {
        match self {
            AcquireError::Construction(_) => None,
            AcquireError::Liveness { pool, .. } => Some(pool),
        }
    }

    pub fn pool(&self) -> Option<&P> {
        match self {
            AcquireError::Construction(_) => None,
            AcquireError::Liveness { pool, .. } => Some(pool),
        }
    }

    pub fn is_liveness(&self) -> bool {
        matches!(self, AcquireError::Liveness { .. })
    }
}

impl<P> From<AcquireError<P>> for AppError {
    fn from(err: AcquireError<P>) -> Self {
        match err {
            AcquireError::Construction(e) => e,
            AcquireError::Liveness { source, .. } => source,
        }
    }
}

/// 目录库连接池管理器
pub struct CatalogPool<C: PoolConnector = PgConnector> {
    provider: Arc<dyn CatalogConfigProvider>,
    connector: C,
    slot: Mutex<Option<C::Pool>>,
}

static GLOBAL_CATALOG_POOL: OnceLock<Arc<CatalogPool>> = OnceLock::new();

impl CatalogPool {
    /// 进程级共享实例，配置来自 `PEERDB_CATALOG_*` 环境变量
    pub fn global() -> Arc<CatalogPool> {
        GLOBAL_CATALOG_POOL
            .get_or_init(|| {
                Arc::new(CatalogPool::new(
                    Arc::new(EnvCatalogConfigProvider),
                    PgConnector,
                ))
            })
            .clone()
    }
}

impl<C: PoolConnector> CatalogPool<C> {
    pub fn new(provider: Arc<dyn CatalogConfigProvider>, connector: C) -> Self {
        Self {
            provider,
            connector,
            slot: Mutex::new(None),
        }
    }

    /// 获取连接池
    ///
    /// 检查与构造在同一把锁内完成，并发的首次调用只会构造一次。
    pub async fn acquire(&self) -> Result<C::Pool, AcquireError<C::Pool>> {
        let pool = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(pool) => pool.clone(),
                None => {
                    let pool = self.construct().await.map_err(AcquireError::Construction)?;
                    *slot = Some(pool.clone());
                    pool
                }
            }
        };

        if let Err(e) = self.connector.ping(&pool).await {
            counter!("catalog_pool_liveness_failures_total").increment(1);
            warn!(error = %e, "Catalog liveness check failed");
            return Err(AcquireError::Liveness { pool, source: e });
        }

        Ok(pool)
    }

    /// 连接池是否已构造
    pub async fn is_initialized(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    async fn construct(&self) -> AppResult<C::Pool> {
        let catalog = self.provider.catalog_config()?;
        let config =
            PostgresConfig::from_catalog(&catalog).with_application_name(CATALOG_APPLICATION_NAME);

        let pool = self.connector.connect(&config).await.map_err(|e| match e {
            e @ AppError::ResourceConstruction { .. } => e,
            other => AppError::resource_construction("catalog pool", other),
        })?;

        counter!("catalog_pool_constructions_total").increment(1);
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Catalog connection pool created"
        );

        Ok(pool)
    }
}
