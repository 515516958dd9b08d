//! 诊断
//!
//! 长期运行的工作单元通过 [`TaskRegistry`] 派生，登记名称、启动时间与派生位置的调用栈。
//! 收到 SIGQUIT 时把所有在册单元与当前线程的调用栈写入日志，进程继续运行。

use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::record_stack_dump;

/// 单元登记后的初始阶段
pub const PHASE_RUNNING: &str = "running";
/// 中断后仍在收尾
pub const PHASE_DRAINING: &str = "draining";

/// 在册工作单元
struct UnitRecord {
    name: String,
    phase: String,
    started: Instant,
    spawned_at: Backtrace,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    units: Mutex<BTreeMap<u64, UnitRecord>>,
}

impl RegistryInner {
    fn units(&self) -> MutexGuard<'_, BTreeMap<u64, UnitRecord>> {
        // 记录本身不会处于中间状态，锁中毒时继续使用
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 工作单元登记表
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

/// 登记凭证，drop 时注销
pub struct UnitGuard {
    inner: Arc<RegistryInner>,
    id: u64,
}

impl UnitGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 更新单元当前阶段，出现在转储里
    pub fn set_phase(&self, phase: impl Into<String>) {
        if let Some(unit) = self.inner.units().get_mut(&self.id) {
            unit.phase = phase.into();
        }
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.inner.units().remove(&self.id);
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个由调用方自行驱动的单元
    #[track_caller]
    pub fn track(&self, name: impl Into<String>) -> UnitGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = UnitRecord {
            name: name.into(),
            phase: PHASE_RUNNING.to_string(),
            started: Instant::now(),
            spawned_at: Backtrace::force_capture(),
        };
        self.inner.units().insert(id, record);
        UnitGuard {
            inner: self.inner.clone(),
            id,
        }
    }

    /// 派生并登记一个 tokio 任务
    ///
    /// `interrupt` 被取消后阶段切换为 `draining`，收尾卡住的单元在转储里一目了然。
    /// 任务结束、被取消或 panic 时自动注销。
    #[track_caller]
    pub fn spawn<F>(
        &self,
        name: impl Into<String>,
        interrupt: &CancellationToken,
        future: F,
    ) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.track(name);
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            tokio::pin!(future);
            tokio::select! {
                output = &mut future => return output,
                _ = interrupt.cancelled() => guard.set_phase(PHASE_DRAINING),
            }
            future.await
        })
    }

    /// 在册单元数量
    pub fn len(&self) -> usize {
        self.inner.units().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 在册单元名称，按登记顺序
    pub fn names(&self) -> Vec<String> {
        self.inner.units().values().map(|u| u.name.clone()).collect()
    }

    /// 在册单元列表（含派生位置调用栈）
    pub fn render_units(&self) -> String {
        let units = self.inner.units();
        let mut out = String::new();

        let _ = writeln!(out, "*** tracked units ({}) ***", units.len());
        for (id, unit) in units.iter() {
            let _ = writeln!(
                out,
                "\nunit #{id} [{}] phase={} uptime={}",
                unit.name,
                unit.phase,
                format_uptime(unit.started.elapsed())
            );
            let _ = writeln!(out, "spawned at:\n{}", unit.spawned_at);
        }
        out
    }

    /// 完整转储文本
    pub fn render_dump(&self, signal: &str) -> String {
        let mut out = format!("=== received {signal} ===\n");

        if let Some(snapshot) = RuntimeSnapshot::capture() {
            let _ = writeln!(
                out,
                "runtime: workers={} alive_tasks={} global_queue_depth={}",
                snapshot.workers, snapshot.alive_tasks, snapshot.global_queue_depth
            );
        }

        out.push_str(&self.render_units());

        let _ = writeln!(
            out,
            "\n*** current thread ***\n{}",
            Backtrace::force_capture()
        );
        let _ = write!(out, "=== end of dump ===");
        out
    }
}

fn format_uptime(elapsed: Duration) -> String {
    format!("{:.3}s", elapsed.as_secs_f64())
}

/// tokio 运行时指标快照
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeSnapshot {
    pub workers: usize,
    pub alive_tasks: usize,
    pub global_queue_depth: usize,
}

impl RuntimeSnapshot {
    /// 不在 tokio 运行时内时返回 None
    pub fn capture() -> Option<Self> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let metrics = handle.metrics();
        Some(Self {
            workers: metrics.num_workers(),
            alive_tasks: metrics.num_alive_tasks(),
            global_queue_depth: metrics.global_queue_depth(),
        })
    }
}

/// 诊断触发源
#[async_trait]
pub trait SignalSource: Send + 'static {
    /// 等待下一次触发，源关闭时返回 None
    async fn recv(&mut self) -> Option<()>;
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for tokio::signal::unix::Signal {
    async fn recv(&mut self) -> Option<()> {
        tokio::signal::unix::Signal::recv(self).await
    }
}

#[async_trait]
impl SignalSource for mpsc::Receiver<()> {
    async fn recv(&mut self) -> Option<()> {
        mpsc::Receiver::recv(self).await
    }
}

/// 转储循环
///
/// 每次触发写一条 warn 日志，直到触发源关闭。不影响生命周期。
pub async fn stack_dump_loop<S: SignalSource>(mut source: S, registry: TaskRegistry) {
    while source.recv().await.is_some() {
        let dump = registry.render_dump("SIGQUIT");
        warn!("{dump}");
        record_stack_dump();
    }
    debug!("Stack dump source closed");
}

/// 安装 SIGQUIT 转储监听
#[cfg(unix)]
pub fn install_stack_dump_handler(registry: TaskRegistry) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let quit = signal(SignalKind::quit())?;
    Ok(tokio::spawn(stack_dump_loop(quit, registry)))
}

#[cfg(not(unix))]
pub fn install_stack_dump_handler(registry: TaskRegistry) -> std::io::Result<JoinHandle<()>> {
    let (_tx, rx) = mpsc::channel::<()>(1);
    debug!("SIGQUIT is not available on this platform");
    Ok(tokio::spawn(stack_dump_loop(rx, registry)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_release() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());

        let a = registry.track("worker");
        let b = registry.track("liveness");
        assert_eq!(registry.names(), vec!["worker", "liveness"]);
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(registry.names(), vec!["liveness"]);
        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_phase_is_rendered() {
        let registry = TaskRegistry::new();
        let guard = registry.track("snapshot-worker");
        guard.set_phase("waiting for interrupt");

        let units = registry.render_units();
        assert!(units.contains("*** tracked units (1) ***"));
        assert!(units.contains("[snapshot-worker] phase=waiting for interrupt"));
        assert!(units.contains("spawned at:"));
    }

    #[test]
    fn test_dump_header() {
        let registry = TaskRegistry::new();
        let _guard = registry.track("api");

        let dump = registry.render_dump("SIGQUIT");
        assert!(dump.starts_with("=== received SIGQUIT ==="));
        assert!(dump.contains("[api]"));
        assert!(dump.contains("*** current thread ***"));
        assert!(dump.ends_with("=== end of dump ==="));
    }

    #[tokio::test]
    async fn test_spawned_task_deregisters_on_completion() {
        let registry = TaskRegistry::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = registry.spawn("short-lived", &CancellationToken::new(), async move {
            let _ = rx.await;
            7
        });
        assert_eq!(registry.names(), vec!["short-lived"]);

        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), 7);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_task_reports_draining_phase() {
        let registry = TaskRegistry::new();
        let interrupt = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = registry.spawn("worker", &interrupt, async move {
            let _ = rx.await;
        });
        assert!(registry.render_units().contains("[worker] phase=running"));

        interrupt.cancel();
        let mut drained = false;
        for _ in 0..100 {
            if registry.render_units().contains("[worker] phase=draining") {
                drained = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained);
        assert!(!handle.is_finished());

        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_task_deregisters_on_panic() {
        let registry = TaskRegistry::new();

        let handle = registry.spawn("doomed", &CancellationToken::new(), async {
            panic!("boom");
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_dump_loop_stops_when_source_closes() {
        let registry = TaskRegistry::new();
        let (tx, rx) = mpsc::channel::<()>(4);
        let handle = tokio::spawn(stack_dump_loop(rx, registry));

        tx.send(()).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dump loop exits")
            .unwrap();
    }

    #[tokio::test]
    async fn test_runtime_snapshot_inside_runtime() {
        let snapshot = RuntimeSnapshot::capture().expect("inside runtime");
        assert_eq!(snapshot.workers, 1);
    }

    #[test]
    fn test_runtime_snapshot_outside_runtime() {
        assert!(RuntimeSnapshot::capture().is_none());
    }
}
