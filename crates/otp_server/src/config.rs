//! Server configuration types and defaults.
//!
//! This module contains the runtime configuration used to initialise the
//! listeners and the behaviour knobs of the handler chain.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration structure for the replication server.
///
/// Contains the two listener addresses, connection limits and the names the
/// handler chain looks up at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address Director participants (AI and UberDog processes) connect to
    pub director_address: SocketAddr,

    /// Address game clients connect to
    pub client_address: SocketAddr,

    /// Maximum number of concurrent connections across both listeners
    pub max_connections: usize,

    /// Connection name identifying the UberDog participant
    pub uberdog_name: String,

    /// Field a client's own avatar may send so that the sender also hears it
    pub talk_field: String,

    /// Seconds between health log lines (0 to disable)
    pub stats_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            director_address: SocketAddr::from(([127, 0, 0, 1], 6666)),
            client_address: SocketAddr::from(([127, 0, 0, 1], 6667)),
            max_connections: 1000,
            uberdog_name: "UberDog".to_string(),
            talk_field: "setTalk".to_string(),
            stats_interval_secs: 60,
        }
    }
}
