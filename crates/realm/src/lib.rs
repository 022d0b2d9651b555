//! # Realm server binary
//!
//! Command-line entry point for the realm game server.
//!
//! ```bash
//! # Run with default configuration (creates config.toml when missing)
//! realm
//!
//! # Override specific settings
//! realm --config production.toml --bind 0.0.0.0:1239 --log-level debug --json-logs
//! ```
//!
//! The server shuts down gracefully on SIGINT or SIGTERM; a second signal
//! exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

pub use app::Application;
pub use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings, ServerSettings};

/// Parses arguments, loads configuration, sets up logging and runs the
/// application to completion.
///
/// Exits the process with status 1 if startup or the server fails.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = match AppConfig::load_from_file(&args.config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "❌ Failed to load configuration from {}: {e}",
                args.config_path.display()
            );
            std::process::exit(1);
        }
    };
    config.apply_cli(&args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(config) {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
