//! # OTP Server - Replication Backbone
//!
//! The runtime of a distributed-object replication server. Simulation
//! processes ("AI" shards and the UberDog) connect to the Message Director;
//! game clients connect to the Client Agent. Between them sit the State
//! Server, which owns every live object, and a small database server backed
//! by an [`ObjectStore`](otp_core::ObjectStore).
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Message Director** ([`director`]) - channel pub/sub between participants
//! * **State Server** ([`state_server`]) - object life-cycle and closure fan-out
//! * **Agent** ([`agent`]) - per-client interests and visibility diffs
//! * **Database server** ([`database`]) - stored values behind channel 4003
//!
//! ### Message Flow
//!
//! 1. A connection task reassembles a `u16`-length-prefixed frame
//! 2. The event loop hands it to the [`Dispatcher`](dispatch::Dispatcher)
//! 3. Director traffic is copied to subscribed participants and queued for
//!    the local handlers; client traffic goes to the Agent
//! 4. Local handlers route their consequences through the same Director
//!    queue, which is drained before the next frame is looked at
//!
//! ## Configuration
//!
//! The server is configured through [`ServerConfig`]: listener addresses,
//! connection limits and the UberDog / talk field names.
//!
//! ## Thread Safety
//!
//! All mutable state lives in the dispatcher, owned by one task. Connection
//! tasks only move bytes; they never touch objects or sessions.

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, DispatcherStats};
pub use error::{AgentError, ServerError};
pub use server::OtpServer;
pub use utils::{create_server, create_server_with_config};

pub mod agent;
pub mod config;
pub mod connection;
pub mod database;
pub mod director;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod state_server;
pub mod utils;

#[cfg(test)]
mod testing;
