//! Command-line interface handling for the OTP server.
//!
//! This module provides command-line argument parsing using the `clap` crate.
//! Every option except `--config` overrides a value from the configuration file.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the Director listener
    pub director_address: Option<String>,
    /// Optional override for the client listener
    pub client_address: Option<String>,
    /// Optional override for the schema file
    pub schema_path: Option<PathBuf>,
    /// Optional override for the visgroup file
    pub visgroups_path: Option<PathBuf>,
    /// Optional directory for the file-backed object store
    pub database_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    ///
    /// Exits with a usage message when the arguments are invalid.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Parses an explicit argument list, the first item being the binary name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.toml")),
            director_address: matches.get_one::<String>("director-bind").cloned(),
            client_address: matches.get_one::<String>("client-bind").cloned(),
            schema_path: matches.get_one::<String>("schema").map(PathBuf::from),
            visgroups_path: matches.get_one::<String>("visgroups").map(PathBuf::from),
            database_dir: matches.get_one::<String>("database").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("OTP Server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Distributed-object replication server: Message Director, State Server and Client Agent")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("director-bind")
                .long("director-bind")
                .value_name("ADDRESS")
                .help("Message Director address (e.g., 127.0.0.1:6666)"),
        )
        .arg(
            Arg::new("client-bind")
                .long("client-bind")
                .value_name("ADDRESS")
                .help("Client Agent address (e.g., 0.0.0.0:6667)"),
        )
        .arg(
            Arg::new("schema")
                .short('s')
                .long("schema")
                .value_name("FILE")
                .help("Class and field schema (TOML)"),
        )
        .arg(
            Arg::new("visgroups")
                .long("visgroups")
                .value_name("FILE")
                .help("Visgroup table (TOML)"),
        )
        .arg(
            Arg::new("database")
                .short('d')
                .long("database")
                .value_name("DIR")
                .help("Directory for stored objects (in-memory when omitted)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}
