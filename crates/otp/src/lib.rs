//! # OTP Server - Main Entry Point
//!
//! Replication backbone for distributed game objects. This entry point
//! handles CLI parsing, configuration loading, and application lifecycle
//! management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! otp-server
//!
//! # Specify custom configuration
//! otp-server --config production.toml
//!
//! # Override specific settings
//! otp-server --schema toon.toml --database /var/lib/otp --log-level debug
//!
//! # JSON logging for production
//! otp-server --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The server handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)
//!
//! A second signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the OTP server process.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
///
/// Must be called from inside a tokio runtime.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging comes first so configuration problems are reported through it.
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    let mut log_settings = config.logging;
    if let Some(level) = &args.log_level {
        log_settings.level = level.clone();
    }
    if let Err(e) = logging::setup_logging(&log_settings, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{AgentSettings, DatabaseSettings, LoggingSettings, SchemaSettings, ServerSettings};
