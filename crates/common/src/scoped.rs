//! 作用域标识符
//!
//! 连接器配置中用于定位目标及其分区键的三段式名称：
//! `origin.target.partition_key`，后两段允许用双引号包裹以支持连字符等特殊字符。

use std::fmt;
use std::str::FromStr;

use flow_errors::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SEPARATOR: char = '.';
const QUOTE: char = '"';

/// 作用域标识符解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopedIdentifierError {
    #[error("invalid scoped identifier '{0}'")]
    InvalidFormat(String),
}

impl From<ScopedIdentifierError> for AppError {
    fn from(err: ScopedIdentifierError) -> Self {
        AppError::configuration(err.to_string())
    }
}

/// 三段式作用域标识符
///
/// 序列化输出不保留原始引号，`parse(to_string())` 与原值按字段相等。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopedIdentifier {
    origin: String,
    target: String,
    partition_key: String,
}

impl ScopedIdentifier {
    /// 解析原始字符串
    pub fn parse(raw: &str) -> Result<Self, ScopedIdentifierError> {
        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let [origin, target, partition_key] = parts.as_slice() else {
            return Err(ScopedIdentifierError::InvalidFormat(raw.to_string()));
        };

        Ok(Self {
            origin: (*origin).to_string(),
            target: target.trim_matches(QUOTE).to_string(),
            partition_key: partition_key.trim_matches(QUOTE).to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }
}

impl FromStr for ScopedIdentifier {
    type Err = ScopedIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ScopedIdentifier {
    type Error = ScopedIdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScopedIdentifier> for String {
    fn from(value: ScopedIdentifier) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ScopedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.origin, self.target, self.partition_key
        )
    }
}
