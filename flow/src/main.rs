//! PeerDB Flows 进程入口
//!
//! `peer-flow worker | snapshot-worker | api`

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use flow::{Cli, DefaultEntryPoints};
use flow_bootstrap::{MetricsRecorder, Service, init_runtime};
use flow_config::TelemetryConfig;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let (telemetry, telemetry_err) = match TelemetryConfig::from_env() {
        Ok(config) => (config, None),
        Err(e) => (TelemetryConfig::default(), Some(e)),
    };
    init_runtime(&telemetry);
    if let Some(e) = telemetry_err {
        warn!(error = %e, "Invalid log settings, using defaults");
    }

    let (role, config) = match cli.command.into_role_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(error = %e, kind = "configuration", "error running app");
            return ExitCode::FAILURE;
        }
    };

    let service = Service::new(MetricsRecorder::install());
    if let Err(e) = service.start() {
        error!(error = %e, "Failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    let entry_points = Arc::new(DefaultEntryPoints::global());
    match service.run_role(entry_points, role.as_str(), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, kind = %e.kind(), "error running app");
            ExitCode::FAILURE
        }
    }
}
