//! Graceful Shutdown
//!
//! 进程生命周期：`Starting -> Running -> ShuttingDown -> Terminated`。
//! 只有取消（SIGINT/SIGTERM 或显式调用 `shutdown`）能进入 `ShuttingDown`。

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::set_lifecycle_state;
use crate::runtime::ShutdownSignals;

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Terminated => "terminated",
        }
    }

    /// 指标取值
    pub fn as_gauge(&self) -> f64 {
        match self {
            LifecycleState::Starting => 0.0,
            LifecycleState::Running => 1.0,
            LifecycleState::ShuttingDown => 2.0,
            LifecycleState::Terminated => 3.0,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生命周期控制器
#[derive(Clone)]
pub struct ServiceLifecycle {
    token: CancellationToken,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        set_lifecycle_state(LifecycleState::Starting);
        Self {
            token: CancellationToken::new(),
            state: Arc::new(state),
        }
    }

    /// 当前状态
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// 交给角色的取消令牌
    ///
    /// 子令牌随根令牌取消，但角色自行取消不会影响进程生命周期。
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 是否已请求关闭
    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// `Starting -> Running`
    pub fn mark_running(&self) {
        self.transition(|s| matches!(s, LifecycleState::Starting), LifecycleState::Running);
    }

    /// 角色已返回且资源已释放
    pub fn mark_terminated(&self) {
        self.transition(|s| *s != LifecycleState::Terminated, LifecycleState::Terminated);
    }

    /// 触发关闭
    ///
    /// 只有第一次调用会取消根令牌并返回 `true`。
    pub fn shutdown(&self) -> bool {
        let first = self.transition(
            |s| matches!(s, LifecycleState::Starting | LifecycleState::Running),
            LifecycleState::ShuttingDown,
        );
        if first {
            info!("Triggering shutdown");
            self.token.cancel();
        }
        first
    }

    /// 安装 SIGINT/SIGTERM 监听
    ///
    /// 收到第一个信号后取消根令牌，监听任务随即退出。
    pub fn install_signal_handlers(&self) -> std::io::Result<JoinHandle<()>> {
        let mut signals = ShutdownSignals::install()?;
        let lifecycle = self.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                signal = signals.recv() => {
                    info!(signal, "Shutdown signal received");
                    lifecycle.shutdown();
                }
                _ = lifecycle.token.cancelled() => {
                    debug!("Shutdown already requested, signal listener exiting");
                }
            }
        }))
    }

    fn transition(&self, allowed: impl Fn(&LifecycleState) -> bool, next: LifecycleState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if allowed(state) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            set_lifecycle_state(next);
            debug!(state = %next, "Lifecycle state changed");
        }
        changed
    }
}

impl Default for ServiceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
