//! PostgreSQL 连接管理

use flow_errors::{AppError, AppResult};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::PostgresConfig;

/// 创建 PostgreSQL 连接池
pub async fn create_pool(config: &PostgresConfig) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.pool_max)
        .min_connections(config.pool_min)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.connection_url())
        .await
        .map_err(|e| AppError::resource_construction("catalog pool", e))
}

/// 检查数据库连接
pub async fn check_connection(pool: &PgPool) -> AppResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| AppError::liveness(format!("catalog ping failed: {}", e)))?;
    Ok(())
}
