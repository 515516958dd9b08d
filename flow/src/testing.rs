//! 测试用的内存连接器

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flow_adapter_postgres::{CatalogPool, PoolConnector, PostgresConfig};
use flow_config::{CatalogConfig, CatalogConfigProvider, ConfigError};
use flow_errors::{AppError, AppResult};

#[derive(Default)]
pub struct FakeConnector {
    pub connect_fails: bool,
    pub connect_delay: Option<Duration>,
    pub ping_fails: AtomicBool,
    pub pings: AtomicUsize,
}

#[async_trait]
impl PoolConnector for FakeConnector {
    type Pool = u32;

    async fn connect(&self, _config: &PostgresConfig) -> AppResult<u32> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.connect_fails {
            return Err(AppError::resource_construction("catalog pool", "refused"));
        }
        Ok(7)
    }

    async fn ping(&self, _pool: &u32) -> AppResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(AppError::liveness("catalog ping failed"));
        }
        Ok(())
    }
}

pub struct StaticCatalog;

impl CatalogConfigProvider for StaticCatalog {
    fn catalog_config(&self) -> Result<CatalogConfig, ConfigError> {
        Ok(CatalogConfig {
            host: "catalog".to_string(),
            port: 5432,
            user: "flow".to_string(),
            password: None,
            database: "peerdb".to_string(),
        })
    }
}

pub fn catalog(connector: FakeConnector) -> Arc<CatalogPool<FakeConnector>> {
    Arc::new(CatalogPool::new(Arc::new(StaticCatalog), connector))
}
