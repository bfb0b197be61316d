// Main entrypoint for the scalegate application.

use scalegate::config::{Config, ConfigTrait, DEFAULT_PROBE_TIMEOUT};
use scalegate::shutdown::GracefulShutdown;
use scalegate::{app, controller, liveness};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONFIG_PATH: &str = "cfg/scalegate.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/scalegate.cfg.local.yaml";

/// scalegate - scale-to-zero activation proxy for Docker Swarm services
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<(Config, String)> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        return Ok((cfg, custom_path.display().to_string()));
    }

    // Try local config first
    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => Ok((cfg, CONFIG_PATH_LOCAL.to_string())),
        Err(_) => {
            // Fall back to default config
            let cfg = Config::load(PathBuf::from(CONFIG_PATH))
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            Ok((cfg, CONFIG_PATH.to_string()))
        }
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        // Production: JSON format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        // Development: Pretty console format
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Create cancellation token for graceful shutdown
    let shutdown_token = CancellationToken::new();

    // Load configuration
    let (cfg, cfg_path) = load_cfg(args.cfg)?;

    // Configure logger (must be done after config is loaded)
    configure_logger(&cfg);
    info!(
        component = "config",
        event = "load_success",
        path = %cfg_path,
        services = cfg.services().len(),
        "config loaded"
    );

    if let Err(e) = controller::metrics::init_prometheus_exporter() {
        warn!(
            component = "main",
            event = "metrics_init_failed",
            error = %e,
            "metrics endpoint will stay empty"
        );
    }

    // Setup graceful shutdown handler
    let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone());
    graceful_shutdown.set_graceful_timeout(Duration::from_secs(30));

    // Initialize liveness probe for Kubernetes/Cloud health checks
    let probe_timeout = cfg
        .k8s()
        .and_then(|k8s| k8s.probe.timeout)
        .unwrap_or(DEFAULT_PROBE_TIMEOUT);
    let probe = Arc::new(liveness::Probe::new(probe_timeout));

    // Validate managed services and build the gates
    let app = app::App::new(shutdown_token.clone(), cfg, probe).await?;

    // Register app for graceful shutdown
    graceful_shutdown.add(1);

    let graceful_done = Arc::new(graceful_shutdown.clone());
    if let Err(e) = app.serve(graceful_done.clone()).await {
        error!(
            component = "main",
            scope = "app",
            event = "start_failed",
            error = %e,
            "failed to start app"
        );
        graceful_done.done();
        shutdown_token.cancel();
    }

    // Listen for OS signals or cancellation and wait for graceful shutdown
    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down service"
        );
        return Err(e);
    }

    Ok(())
}
