//! # upkeep Agent
//!
//! Command-line front end of the update controller. Talks to the update
//! service of a running application instance and walks it through
//! check, download and install.
//!
//! ## Usage
//! ```bash
//! upkeep check --notify-if-latest
//! upkeep --config /etc/upkeep/agent.yaml run
//! upkeep --server http://127.0.0.1:8000 watch
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use upkeep_core::{HttpUpdateService, MockUpdateService, UpdateController, UpdateService};

mod cli;
mod commands;
mod config;

use cli::Args;
use config::{Config, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so its level and format apply
    let (config, source) = match &args.config {
        Some(config_path) => {
            // Explicit config file provided
            let cfg = Config::load(config_path)?;
            (cfg.with_cli_overrides(&args), Some(config_path.clone()))
        }
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg.with_cli_overrides(&args), Some(DEFAULT_CONFIG_PATH.to_string())),
            Err(_) => (Config::default().with_cli_overrides(&args), None),
        },
    };

    // Initialize logging
    upkeep_common::init_logging_with_format(&config.log_level, config.log_format)?;

    match &source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration rejected");
        return Err(e);
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.updates.server_url,
        log_format = %config.log_format,
        mock = args.mock,
        "Starting upkeep"
    );

    let service: Arc<dyn UpdateService> = if args.mock {
        Arc::new(demo_service())
    } else {
        Arc::new(HttpUpdateService::new(&config.updates)?)
    };
    let controller = Arc::new(UpdateController::new(service, config.updates));

    let outcome = commands::dispatch(&controller, &args.command).await?;
    Ok(outcome.into())
}

/// In-memory service that always offers one newer release.
fn demo_service() -> MockUpdateService {
    let service = MockUpdateService::new();
    service.set_check(Ok(MockUpdateService::update_available(
        env!("CARGO_PKG_VERSION"),
        "99.0.0",
    )));
    service
}
