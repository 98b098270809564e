//! Rusty Relay - A connection-oriented TCP broadcast relay
//!
//! Every chunk of bytes received from one client is forwarded verbatim to
//! all other connected clients. This library provides the connection
//! registry, the per-connection workers and the acceptor loop.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;

// Re-export main components
pub use config::*;
pub use constants::*;
