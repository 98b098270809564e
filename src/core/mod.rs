//! Core functionality for the relay server

pub mod connection;
pub mod registry;
pub mod server;
pub mod worker;
pub mod worker_pool;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionId, ConnectionReader, Received};
pub use registry::{create_registry, BroadcastReport, Registry, SharedRegistry};
pub use server::RelayServer;
pub use worker::{ConnectionWorker, WorkerState};
pub use worker_pool::WorkerPool;
