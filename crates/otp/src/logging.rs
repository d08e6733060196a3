//! Process-wide `tracing` subscriber and the startup banner.

use crate::config::LoggingSettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber: JSON lines when either `json_format` or
/// the `[logging]` section asks for them, ANSI text otherwise.
///
/// A `RUST_LOG` filter wins over `config.level`. Fails if a subscriber is
/// already installed.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Connection tasks run on worker threads; the event loop is the thread to watch.
    let layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(true)
        .with_thread_names(true);
    let registry = tracing_subscriber::registry().with(filter);
    if json_format || config.json_format {
        registry.with(layer.json()).try_init()?;
    } else {
        registry.with(layer.with_ansi(true)).try_init()?;
    }

    info!("📝 Log filter {} installed", level);
    Ok(())
}

/// Logs the component list once the configuration is accepted.
pub fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║             🌐 OTP SERVER 🌐             ║");
    info!("║   Distributed Object Replication v{}  ║", version);
    info!("║                                          ║");
    info!("║  📡 Message Director                     ║");
    info!("║  🗃️  State Server                         ║");
    info!("║  👀 Client Agent                         ║");
    info!("║  💾 Database Server                      ║");
    info!("║                                          ║");
    info!("╚══════════════════════════════════════════╝");
}
