//! Main application logic and lifecycle management.
//!
//! This module contains the [`Application`] struct that loads the schema,
//! zone geometry and object store named by the configuration, runs the
//! server and reports on shutdown.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals::spawn_signal_handler};
use otp_core::{CodecProvider, FileStore, MemoryStore, ObjectStore, ShutdownState, TomlSchema, VisGroups, ZoneGeometry};
use otp_server::OtpServer;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The server process.
///
/// # Architecture
///
/// * **Configuration Management**: Loads and validates configuration from files and CLI
/// * **Collaborators**: Schema, visgroups and object store handed to the server
/// * **Graceful Shutdown**: Signals flip the shared shutdown state
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Replication server instance
    server: OtpServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Load the schema, visgroups and object store
    /// 5. Build the server
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let schema = load_schema(Path::new(&config.schema.path))?;
        let geometry = load_geometry(config.schema.visgroups.as_deref())?;
        let store = open_store(config.database.directory.as_deref())?;
        let server = OtpServer::new(server_config, schema, geometry, store);

        Ok(Self { config, server })
    }

    /// Runs the server until a termination signal has been handled.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting OTP Server Application");
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();
        spawn_signal_handler(shutdown_state.clone());
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        self.server.start(shutdown_state.clone()).await?;
        shutdown_state.complete_shutdown();

        info!("✅ OTP Server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  📡 Director address: {}", self.config.server.director_address);
        info!("  🎮 Client address: {}", self.config.server.client_address);
        info!("  📜 Schema: {}", self.config.schema.path);
        info!(
            "  🗺️ Visgroups: {}",
            self.config.schema.visgroups.as_deref().unwrap_or("none")
        );
        info!(
            "  💾 Database: {}",
            self.config.database.directory.as_deref().unwrap_or("in-memory")
        );
        info!("  👥 Max connections: {}", self.config.server.max_connections);
    }
}

/// Applies command-line overrides on top of the file configuration.
pub(crate) fn apply_overrides(config: &mut AppConfig, args: CliArgs) {
    if let Some(address) = args.director_address {
        config.server.director_address = address;
    }
    if let Some(address) = args.client_address {
        config.server.client_address = address;
    }
    if let Some(path) = args.schema_path {
        config.schema.path = path.to_string_lossy().to_string();
    }
    if let Some(path) = args.visgroups_path {
        config.schema.visgroups = Some(path.to_string_lossy().to_string());
    }
    if let Some(dir) = args.database_dir {
        config.database.directory = Some(dir.to_string_lossy().to_string());
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

fn load_schema(path: &Path) -> Result<Arc<dyn CodecProvider>, Box<dyn std::error::Error>> {
    let schema = TomlSchema::load(path)
        .map_err(|e| format!("Failed to load schema {}: {e}", path.display()))?;
    info!("📜 Loaded {} class(es) from {}", schema.class_count(), path.display());
    Ok(Arc::new(schema))
}

fn load_geometry(path: Option<&str>) -> Result<Arc<dyn ZoneGeometry>, Box<dyn std::error::Error>> {
    let visgroups = match path {
        Some(path) => VisGroups::load(path).map_err(|e| format!("Failed to load visgroups {path}: {e}"))?,
        None => VisGroups::empty(),
    };
    Ok(Arc::new(visgroups))
}

fn open_store(directory: Option<&str>) -> Result<Box<dyn ObjectStore>, Box<dyn std::error::Error>> {
    match directory {
        Some(directory) => {
            let store = FileStore::open(directory)
                .map_err(|e| format!("Failed to open database {directory}: {e}"))?;
            info!("💾 Stored objects kept under {}", directory);
            Ok(Box::new(store))
        }
        None => Ok(Box::new(MemoryStore::new())),
    }
}
