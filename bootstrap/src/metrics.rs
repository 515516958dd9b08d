//! Metrics 模块
//!
//! 提供 Prometheus metrics 导出与生命周期相关的指标

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

use crate::shutdown::LifecycleState;

/// Metrics 记录器
///
/// recorder 安装失败时仍可使用，`render` 返回空文本。
#[derive(Clone, Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// 安装全局 Prometheus recorder
    pub fn install() -> Self {
        match flow_telemetry::init_metrics() {
            Ok(handle) => Self::from_handle(handle),
            Err(e) => {
                warn!(error = %e, "Prometheus recorder not installed");
                Self::disabled()
            }
        }
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// 不导出任何指标
    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    /// 获取 Prometheus 格式的 metrics
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(PrometheusHandle::render)
            .unwrap_or_default()
    }
}

/// 记录角色启动
pub fn record_role_start(role: &str) {
    let labels = [("role", role.to_string())];
    counter!("role_starts_total", &labels).increment(1);
}

/// 记录一次堆栈转储
pub fn record_stack_dump() {
    counter!("stack_dumps_total").increment(1);
}

/// 设置生命周期状态
pub fn set_lifecycle_state(state: LifecycleState) {
    gauge!("lifecycle_state").set(state.as_gauge());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_recorder_renders_empty() {
        let recorder = MetricsRecorder::disabled();
        assert!(!recorder.is_enabled());
        assert_eq!(recorder.render(), "");
    }
}
