//! 角色配置
//!
//! 每个角色在启动前由命令行/环境变量构造一次，之后按值传入入口函数

use std::fmt;
use std::str::FromStr;

use secrecy::Secret;

use crate::ConfigError;

/// 默认编排服务地址
pub const DEFAULT_TEMPORAL_HOST_PORT: &str = "localhost:7233";
/// 默认编排命名空间
pub const DEFAULT_TEMPORAL_NAMESPACE: &str = "default";
/// 默认最大并发活动数
pub const DEFAULT_MAX_CONCURRENT_ACTIVITIES: usize = 1000;
/// 默认最大并发工作流任务数
pub const DEFAULT_MAX_CONCURRENT_WORKFLOW_TASKS: usize = 1000;
/// API 默认端口
pub const DEFAULT_API_PORT: u16 = 8110;
/// API 网关默认端口
pub const DEFAULT_GATEWAY_PORT: u16 = 8111;

/// 进程角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Worker,
    SnapshotWorker,
    Api,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::SnapshotWorker => "snapshot-worker",
            Role::Api => "api",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Role::Worker),
            "snapshot-worker" => Ok(Role::SnapshotWorker),
            "api" => Ok(Role::Api),
            other => Err(ConfigError::Invalid {
                name: "role",
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// 编排服务客户端 TLS 证书对
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    pub cert: String,
    pub key: Secret<String>,
}

/// 编排服务连接配置
#[derive(Debug, Clone)]
pub struct TemporalSettings {
    pub host_port: String,
    pub namespace: String,
    pub tls: Option<TlsIdentity>,
}

impl TemporalSettings {
    /// 创建连接配置
    ///
    /// 证书与密钥为空字符串时视为未提供；二者必须同时提供或同时缺省。
    pub fn new(
        host_port: impl Into<String>,
        namespace: impl Into<String>,
        cert: Option<String>,
        key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let host_port = host_port.into();
        if host_port.trim().is_empty() {
            return Err(ConfigError::Missing("TEMPORAL_HOST_PORT"));
        }

        let cert = cert.filter(|c| !c.is_empty());
        let key = key.filter(|k| !k.is_empty());
        let tls = match (cert, key) {
            (Some(cert), Some(key)) => Some(TlsIdentity {
                cert,
                key: Secret::new(key),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("TEMPORAL_CLIENT_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("TEMPORAL_CLIENT_CERT")),
        };

        Ok(Self {
            host_port,
            namespace: namespace.into(),
            tls,
        })
    }
}

impl Default for TemporalSettings {
    fn default() -> Self {
        Self {
            host_port: DEFAULT_TEMPORAL_HOST_PORT.to_string(),
            namespace: DEFAULT_TEMPORAL_NAMESPACE.to_string(),
            tls: None,
        }
    }
}

/// worker 角色配置
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub temporal: TemporalSettings,
    pub enable_profiling: bool,
    pub pyroscope_server: String,
    pub max_concurrent_activities: usize,
    pub max_concurrent_workflow_tasks: usize,
}

impl WorkerOptions {
    pub fn new(temporal: TemporalSettings) -> Self {
        Self {
            temporal,
            enable_profiling: false,
            pyroscope_server: String::new(),
            max_concurrent_activities: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
            max_concurrent_workflow_tasks: DEFAULT_MAX_CONCURRENT_WORKFLOW_TASKS,
        }
    }

    /// 设置并发上限
    pub fn with_concurrency(mut self, activities: usize, workflow_tasks: usize) -> Self {
        self.max_concurrent_activities = activities;
        self.max_concurrent_workflow_tasks = workflow_tasks;
        self
    }

    /// 校验并发上限
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_activities == 0 {
            return Err(ConfigError::Invalid {
                name: "TEMPORAL_MAX_CONCURRENT_ACTIVITIES",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrent_workflow_tasks == 0 {
            return Err(ConfigError::Invalid {
                name: "TEMPORAL_MAX_CONCURRENT_WORKFLOW_TASKS",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// snapshot-worker 角色配置
#[derive(Debug, Clone, Default)]
pub struct SnapshotWorkerOptions {
    pub temporal: TemporalSettings,
}

/// api 角色配置
#[derive(Debug, Clone)]
pub struct ApiServerParams {
    pub port: u16,
    pub gateway_port: u16,
    pub temporal: TemporalSettings,
}

impl ApiServerParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == self.gateway_port {
            return Err(ConfigError::Invalid {
                name: "gateway-port",
                reason: format!("must differ from port {}", self.port),
            });
        }
        Ok(())
    }
}

impl Default for ApiServerParams {
    fn default() -> Self {
        Self {
            port: DEFAULT_API_PORT,
            gateway_port: DEFAULT_GATEWAY_PORT,
            temporal: TemporalSettings::default(),
        }
    }
}

/// 某一角色的完整配置
#[derive(Debug, Clone)]
pub enum RoleConfig {
    Worker(WorkerOptions),
    SnapshotWorker(SnapshotWorkerOptions),
    Api(ApiServerParams),
}

impl RoleConfig {
    /// 配置所属角色
    pub fn role(&self) -> Role {
        match self {
            RoleConfig::Worker(_) => Role::Worker,
            RoleConfig::SnapshotWorker(_) => Role::SnapshotWorker,
            RoleConfig::Api(_) => Role::Api,
        }
    }

    /// 编排服务连接配置
    pub fn temporal(&self) -> &TemporalSettings {
        match self {
            RoleConfig::Worker(opts) => &opts.temporal,
            RoleConfig::SnapshotWorker(opts) => &opts.temporal,
            RoleConfig::Api(params) => &params.temporal,
        }
    }
}
