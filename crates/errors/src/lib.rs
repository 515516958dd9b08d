//! flow-errors - 统一错误处理
//!
//! 进程启动、资源池生命周期与角色运行期间的错误分类

use std::fmt;

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to construct {resource}: {message}")]
    ResourceConstruction { resource: String, message: String },

    #[error("Liveness check failed: {0}")]
    Liveness(String),

    #[error("Failed to bootstrap {role}: {message}")]
    RoleBootstrap { role: String, message: String },

    #[error("Runnable error: {0}")]
    Runnable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn resource_construction(resource: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::ResourceConstruction {
            resource: resource.into(),
            message: msg.to_string(),
        }
    }

    pub fn liveness(msg: impl Into<String>) -> Self {
        Self::Liveness(msg.into())
    }

    pub fn role_bootstrap(role: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::RoleBootstrap {
            role: role.into(),
            message: msg.to_string(),
        }
    }

    pub fn runnable(msg: impl Into<String>) -> Self {
        Self::Runnable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ResourceConstruction { .. } => ErrorKind::ResourceConstruction,
            Self::Liveness(_) => ErrorKind::Liveness,
            Self::RoleBootstrap { .. } => ErrorKind::RoleBootstrap,
            Self::Runnable(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Runnable,
        }
    }
}

/// 错误分类（用于日志字段与指标标签）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    ResourceConstruction,
    Liveness,
    RoleBootstrap,
    Runnable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::ResourceConstruction => "resource_construction",
            ErrorKind::Liveness => "liveness",
            ErrorKind::RoleBootstrap => "role_bootstrap",
            ErrorKind::Runnable => "runnable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
