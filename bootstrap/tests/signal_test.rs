//! 真实信号测试
//!
//! 信号在发送之前就已注册，tokio 接管后默认动作不再生效。

#![cfg(unix)]

mod common;

use std::process::Command;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use flow_bootstrap::{LifecycleState, ServiceLifecycle, TaskRegistry, install_stack_dump_handler};

use common::CapturedLogs;

/// SIGINT/SIGTERM 会送达进程内所有监听者，关闭类测试串行执行
static SHUTDOWN_SIGNALS: Mutex<()> = Mutex::new(());

fn send_signal(name: &str) {
    let status = Command::new("kill")
        .arg(format!("-{name}"))
        .arg(std::process::id().to_string())
        .status()
        .expect("kill is available");
    assert!(status.success());
}

async fn assert_signal_triggers_shutdown_once(name: &str) {
    let lifecycle = ServiceLifecycle::new();
    lifecycle.mark_running();
    let listener = lifecycle.install_signal_handlers().unwrap();
    let role_token = lifecycle.token();

    send_signal(name);

    tokio::time::timeout(Duration::from_secs(5), role_token.cancelled())
        .await
        .expect("role token cancelled by signal");
    listener.await.unwrap();

    assert_eq!(lifecycle.state(), LifecycleState::ShuttingDown);
    assert!(!lifecycle.shutdown());
}

#[tokio::test]
async fn test_sigterm_triggers_shutdown_once() {
    let _serial = SHUTDOWN_SIGNALS.lock().unwrap_or_else(PoisonError::into_inner);
    assert_signal_triggers_shutdown_once("TERM").await;
}

#[tokio::test]
async fn test_sigint_triggers_shutdown_once() {
    let _serial = SHUTDOWN_SIGNALS.lock().unwrap_or_else(PoisonError::into_inner);
    assert_signal_triggers_shutdown_once("INT").await;
}

#[tokio::test]
async fn test_sigquit_dumps_and_process_continues() {
    let (logs, _guard) = CapturedLogs::install();

    let lifecycle = ServiceLifecycle::new();
    lifecycle.mark_running();
    let registry = TaskRegistry::new();
    let _unit = registry.track("snapshot-worker");
    let dumper = install_stack_dump_handler(registry).unwrap();

    send_signal("QUIT");
    assert!(logs.wait_for("=== received SIGQUIT ===", 1).await);

    send_signal("QUIT");
    assert!(logs.wait_for("=== received SIGQUIT ===", 2).await);

    assert!(logs.contents().contains("[snapshot-worker]"));
    assert!(!dumper.is_finished());
    assert!(!lifecycle.is_shutdown_requested());
    assert_eq!(lifecycle.state(), LifecycleState::Running);
}
