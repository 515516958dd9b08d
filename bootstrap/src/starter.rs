//! 服务启动器
//!
//! 把生命周期、诊断与角色分发组合成统一的进程入口。

use std::net::SocketAddr;
use std::sync::Arc;

use flow_config::RoleConfig;
use flow_errors::AppResult;
use tracing::{info, warn};

use crate::diagnostics::{TaskRegistry, install_stack_dump_handler};
use crate::dispatcher::{EntryPoints, RoleDispatcher};
use crate::introspection::{DEFAULT_INTROSPECTION_ADDR, IntrospectionServer};
use crate::metrics::MetricsRecorder;
use crate::shutdown::ServiceLifecycle;

/// 进程级服务骨架
pub struct Service {
    lifecycle: ServiceLifecycle,
    registry: TaskRegistry,
    metrics: MetricsRecorder,
    introspection_addr: SocketAddr,
}

impl Service {
    pub fn new(metrics: MetricsRecorder) -> Self {
        Self {
            lifecycle: ServiceLifecycle::new(),
            registry: TaskRegistry::new(),
            metrics,
            introspection_addr: DEFAULT_INTROSPECTION_ADDR,
        }
    }

    /// 覆盖诊断服务地址
    pub fn with_introspection_addr(mut self, addr: SocketAddr) -> Self {
        self.introspection_addr = addr;
        self
    }

    pub fn lifecycle(&self) -> &ServiceLifecycle {
        &self.lifecycle
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// 安装信号监听并启动诊断服务
    ///
    /// 关闭信号监听安装失败时返回错误；转储监听与诊断服务只是尽力而为。
    pub fn start(&self) -> std::io::Result<()> {
        self.lifecycle.install_signal_handlers()?;

        if let Err(e) = install_stack_dump_handler(self.registry.clone()) {
            warn!(error = %e, "Stack dump handler not installed");
        }

        IntrospectionServer::new(
            self.lifecycle.clone(),
            self.registry.clone(),
            self.metrics.clone(),
        )
        .with_addr(self.introspection_addr)
        .spawn();

        info!("Service lifecycle started");
        Ok(())
    }

    /// 运行一个角色直到结束
    pub async fn run_role<E: EntryPoints>(
        &self,
        entry_points: Arc<E>,
        role: &str,
        config: RoleConfig,
    ) -> AppResult<()> {
        let dispatcher = RoleDispatcher::new(entry_points, self.registry.clone())
            .with_lifecycle(self.lifecycle.clone());

        let result = dispatcher.dispatch(role, config, self.lifecycle.token()).await;

        self.lifecycle.mark_terminated();
        info!(state = %self.lifecycle.state(), "Service stopped");
        result
    }
}
