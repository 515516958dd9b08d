//! flow-config - 配置加载库
//!
//! 目录库连接参数与日志配置均来自环境变量

pub mod roles;

pub use roles::*;

use std::collections::BTreeMap;

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use flow_errors::AppError;
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

/// 目录库环境变量前缀
pub const CATALOG_ENV_PREFIX: &str = "PEERDB_CATALOG_";
/// 日志环境变量前缀
pub const LOG_ENV_PREFIX: &str = "PEERDB_LOG_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::configuration(err.to_string())
    }
}

/// 目录库配置
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<Secret<String>>,
    pub database: String,
}

/// 环境变量原始形态，字段缺失时再统一校验
#[derive(Debug, Deserialize)]
struct RawCatalogConfig {
    host: Option<String>,
    port: Option<String>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

const DEFAULT_CATALOG_PORT: u16 = 5432;

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// 按原文读取带前缀的环境变量
///
/// `Env` 会把 `007123`、`1.50`、`[a,b]` 之类的值推断成数字或数组，
/// 凭据必须逐字保留，所以这里只借用它的前缀匹配，值一律作为字符串。
fn verbatim_env(prefix: &str) -> Figment {
    let vars: BTreeMap<String, String> = Env::prefixed(prefix)
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), value))
        .collect();
    Figment::from(Serialized::defaults(vars))
}

fn parse_port(value: Option<String>) -> Result<u16, ConfigError> {
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(DEFAULT_CATALOG_PORT);
    };
    match value.trim().parse::<u16>() {
        Ok(0) => Err(ConfigError::Invalid {
            name: "PEERDB_CATALOG_PORT",
            reason: "port must be non-zero".to_string(),
        }),
        Ok(port) => Ok(port),
        Err(e) => Err(ConfigError::Invalid {
            name: "PEERDB_CATALOG_PORT",
            reason: format!("'{value}': {e}"),
        }),
    }
}

impl CatalogConfig {
    /// 从 `PEERDB_CATALOG_*` 环境变量加载
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(verbatim_env(CATALOG_ENV_PREFIX))
    }

    /// 从任意 figment 来源加载（测试与嵌入场景）
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let raw: RawCatalogConfig = figment.extract()?;

        Ok(Self {
            host: required(raw.host, "PEERDB_CATALOG_HOST")?,
            port: parse_port(raw.port)?,
            user: required(raw.user, "PEERDB_CATALOG_USER")?,
            password: raw.password.filter(|p| !p.is_empty()).map(Secret::new),
            database: required(raw.database, "PEERDB_CATALOG_DATABASE")?,
        })
    }
}

/// 目录库配置来源
///
/// 连接池在每次构造尝试时调用，构造失败后的重试会重新读取配置。
pub trait CatalogConfigProvider: Send + Sync {
    fn catalog_config(&self) -> Result<CatalogConfig, ConfigError>;
}

/// 从进程环境读取目录库配置
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCatalogConfigProvider;

impl CatalogConfigProvider for EnvCatalogConfigProvider {
    fn catalog_config(&self) -> Result<CatalogConfig, ConfigError> {
        CatalogConfig::from_env()
    }
}

/// 固定配置（已加载好的配置直接复用）
impl CatalogConfigProvider for CatalogConfig {
    fn catalog_config(&self) -> Result<CatalogConfig, ConfigError> {
        Ok(self.clone())
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// 从 `PEERDB_LOG_*` 环境变量加载
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Figment::new()
            .merge(Env::prefixed(LOG_ENV_PREFIX))
            .extract()?;
        Ok(config)
    }
}
