//! Core server implementation and connection handling.
//!
//! This module contains the listeners, the per-connection socket tasks and
//! the single event loop that owns the [`Dispatcher`](crate::dispatch::Dispatcher).

pub mod core;
pub mod event_loop;
pub mod handlers;

pub use core::OtpServer;
pub use event_loop::ServerEvent;
