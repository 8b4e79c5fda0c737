//! # mised
//!
//! Long-running engine process: applies migrations, then runs the waste
//! sweeper until Ctrl+C or SIGTERM.
//!
//! ```bash
//! mised                      # config from the platform config dir
//! mised --config ./mise.toml
//! ```

use std::path::PathBuf;

use tracing::{error, info};

use mise_engine::telemetry::init_tracing;
use mise_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_arg();
    let config = EngineConfig::load(config_path)?;
    info!(
        db = ?config.database.path,
        ledger_timeout_ms = config.ledger.timeout_ms,
        expiry_hours = config.waste.expiry_hours,
        "Starting mised"
    );

    let engine = Engine::open(config).await?;

    let (sweeper, sweeper_handle) = engine.sweeper();
    let sweeper_task = tokio::spawn(sweeper.run());

    shutdown_signal().await;

    if let Err(e) = sweeper_handle.shutdown().await {
        error!(error = %e, "Failed to stop waste sweeper");
    }
    if let Err(e) = sweeper_task.await {
        error!(error = %e, "Waste sweeper task panicked");
    }

    engine.database().close().await;
    info!("mised stopped");
    Ok(())
}

fn parse_config_arg() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
