use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use drover_agent::{Agent, Config};
use drover_observe::{init_logging, LogConfig, LogFormat};

/// Fleet agent daemon: executes controller-dispatched work on this host.
#[derive(Debug, Parser)]
#[command(name = "drover", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level (e.g. `debug`).
    #[arg(long)]
    log_level: Option<String>,

    /// Override the configured log format (`text` or `json`).
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load configuration: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => match Config::parse("") {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to build default configuration: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let format = cli
        .log_format
        .as_deref()
        .or(Some(config.logging.format.as_str()))
        .and_then(LogFormat::from_name)
        .unwrap_or_default();
    if let Err(e) = init_logging(&LogConfig {
        level,
        format,
        ..Default::default()
    }) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let agent = match Agent::new(config) {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = %e, "failed to build agent");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = agent.start().await {
        error!(error = %e, "failed to start agent");
        return ExitCode::FAILURE;
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    if let Err(e) = agent.stop().await {
        error!(error = %e, "error during shutdown");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
