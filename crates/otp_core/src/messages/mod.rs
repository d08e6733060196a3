//! Typed messages, one closed enum per consuming component.
//!
//! Each enum decodes from a message code plus payload and fails with
//! [`crate::error::ProtocolError::UnknownCode`] for codes the component does
//! not handle, so nothing silently falls through.

mod client;
mod control;
mod database;
mod envelope;
mod state;

pub use client::ClientMessage;
pub use control::ControlMessage;
pub use database::DatabaseMessage;
pub use envelope::{DirectorDatagram, Envelope};
pub use state::StateServerMessage;
