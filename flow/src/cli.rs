//! 命令行参数
//!
//! 每个参数都可以由对应的环境变量提供。

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use flow_config::{
    ApiServerParams, ConfigError, DEFAULT_API_PORT, DEFAULT_GATEWAY_PORT,
    DEFAULT_MAX_CONCURRENT_ACTIVITIES, DEFAULT_MAX_CONCURRENT_WORKFLOW_TASKS,
    DEFAULT_TEMPORAL_HOST_PORT, DEFAULT_TEMPORAL_NAMESPACE, Role, RoleConfig,
    SnapshotWorkerOptions, TemporalSettings, WorkerOptions,
};

/// 默认 pyroscope 地址
pub const DEFAULT_PYROSCOPE_SERVER_ADDRESS: &str = "http://pyroscope:4040";

#[derive(Debug, Parser)]
#[command(name = "peer-flow", version, about = "PeerDB Flows CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the workflow worker until interrupted.
    Worker(WorkerArgs),
    /// Run the snapshot worker.
    SnapshotWorker(SnapshotWorkerArgs),
    /// Serve the API and its HTTP gateway.
    Api(ApiArgs),
}

/// 编排服务连接参数
#[derive(Debug, Clone, Args)]
pub struct TemporalArgs {
    /// Orchestration endpoint.
    #[arg(long, env = "TEMPORAL_HOST_PORT", default_value = DEFAULT_TEMPORAL_HOST_PORT)]
    pub temporal_host_port: String,

    /// Client certificate (PEM).
    #[arg(long, env = "TEMPORAL_CLIENT_CERT", hide_env_values = true)]
    pub temporal_cert: Option<String>,

    /// Client private key (PEM).
    #[arg(long, env = "TEMPORAL_CLIENT_KEY", hide_env_values = true)]
    pub temporal_key: Option<String>,

    /// Namespace used for workflow orchestration.
    #[arg(long, env = "PEERDB_TEMPORAL_NAMESPACE", default_value = DEFAULT_TEMPORAL_NAMESPACE)]
    pub temporal_namespace: String,
}

impl TemporalArgs {
    pub fn settings(&self) -> Result<TemporalSettings, ConfigError> {
        TemporalSettings::new(
            self.temporal_host_port.clone(),
            self.temporal_namespace.clone(),
            self.temporal_cert.clone(),
            self.temporal_key.clone(),
        )
    }
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub temporal: TemporalArgs,

    /// Enable profiling for the application.
    #[arg(
        long,
        env = "ENABLE_PROFILING",
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    pub enable_profiling: bool,

    /// HTTP server address for pyroscope.
    #[arg(long, env = "PYROSCOPE_SERVER_ADDRESS", default_value = DEFAULT_PYROSCOPE_SERVER_ADDRESS)]
    pub pyroscope_server_address: String,

    /// Maximum number of concurrent activities.
    #[arg(long, env = "TEMPORAL_MAX_CONCURRENT_ACTIVITIES", default_value_t = DEFAULT_MAX_CONCURRENT_ACTIVITIES)]
    pub temporal_max_concurrent_activities: usize,

    /// Maximum number of concurrent workflow tasks.
    #[arg(long, env = "TEMPORAL_MAX_CONCURRENT_WORKFLOW_TASKS", default_value_t = DEFAULT_MAX_CONCURRENT_WORKFLOW_TASKS)]
    pub temporal_max_concurrent_workflow_tasks: usize,
}

#[derive(Debug, Clone, Args)]
pub struct SnapshotWorkerArgs {
    #[command(flatten)]
    pub temporal: TemporalArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ApiArgs {
    /// gRPC listen port.
    #[arg(short, long, default_value_t = DEFAULT_API_PORT)]
    pub port: u16,

    /// Port the HTTP gateway listens on.
    #[arg(long, default_value_t = DEFAULT_GATEWAY_PORT)]
    pub gateway_port: u16,

    #[command(flatten)]
    pub temporal: TemporalArgs,
}

impl Command {
    /// 转换为角色与其配置
    pub fn into_role_config(self) -> Result<(Role, RoleConfig), ConfigError> {
        match self {
            Command::Worker(args) => {
                let mut opts = WorkerOptions::new(args.temporal.settings()?).with_concurrency(
                    args.temporal_max_concurrent_activities,
                    args.temporal_max_concurrent_workflow_tasks,
                );
                opts.pyroscope_server = args.pyroscope_server_address;
                opts.enable_profiling = args.enable_profiling;
                Ok((Role::Worker, RoleConfig::Worker(opts)))
            }
            Command::SnapshotWorker(args) => Ok((
                Role::SnapshotWorker,
                RoleConfig::SnapshotWorker(SnapshotWorkerOptions {
                    temporal: args.temporal.settings()?,
                }),
            )),
            Command::Api(args) => Ok((
                Role::Api,
                RoleConfig::Api(ApiServerParams {
                    port: args.port,
                    gateway_port: args.gateway_port,
                    temporal: args.temporal.settings()?,
                }),
            )),
        }
    }
}
