//! Utility functions for building servers.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use crate::{config::ServerConfig, server::OtpServer};
use otp_core::{CodecProvider, MemoryStore, VisGroups};
use std::sync::Arc;

/// Creates a server with default configuration, no visibility groups and an
/// in-memory object store.
///
/// This is a convenience function for development and testing.
pub fn create_server(schema: Arc<dyn CodecProvider>) -> OtpServer {
    create_server_with_config(ServerConfig::default(), schema)
}

/// Creates a server with custom configuration.
///
/// # Example
///
/// ```rust
/// use otp_core::TomlSchema;
/// use otp_server::{create_server_with_config, ServerConfig};
/// use std::sync::Arc;
///
/// let schema = TomlSchema::parse("[[class]]\nname = \"DistributedNode\"\n").unwrap();
/// let config = ServerConfig {
///     director_address: "0.0.0.0:7199".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config, Arc::new(schema));
/// assert_eq!(server.config().max_connections, 5000);
/// ```
pub fn create_server_with_config(config: ServerConfig, schema: Arc<dyn CodecProvider>) -> OtpServer {
    OtpServer::new(
        config,
        schema,
        Arc::new(VisGroups::empty()),
        Box::new(MemoryStore::new()),
    )
}
