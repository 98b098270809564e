//! Shared registry of live connections
//!
//! One mutex guards the whole map. A broadcast keeps the lock for its entire
//! traversal, so broadcasts from different senders never interleave their
//! writes. The cost is that one slow peer stalls every other broadcaster
//! and every insert/remove until its write completes.
//!
//! A peer removed after a failed send may still have a readable stream. Its
//! worker checks registration before broadcasting and stops once it finds
//! itself gone, so an unregistered peer never relays.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::core::connection::{Connection, ConnectionId};
use crate::error::{Result, RustyRelayError};

/// What a single broadcast did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sends tried, one per registered connection other than the sender
    pub attempted: usize,
    /// Sends that completed
    pub delivered: usize,
    /// Peers whose send failed; already removed from the registry
    pub dropped: Vec<ConnectionId>,
}

/// Mapping from connection id to the send side of each live connection
#[derive(Debug, Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new connection
    ///
    /// An id that is already present is rejected and the existing entry
    /// is kept; the rejected connection is closed when dropped.
    pub async fn insert(&self, connection: Connection) -> Result<()> {
        let mut connections = self.connections.lock().await;
        match connections.entry(connection.id()) {
            Entry::Occupied(entry) => Err(RustyRelayError::DuplicateId(*entry.key())),
            Entry::Vacant(slot) => {
                slot.insert(connection);
                Ok(())
            }
        }
    }

    /// Remove a connection and close its send side
    ///
    /// Returns `false` if the id was not registered, which happens when a
    /// broadcaster already dropped the peer before its own worker got here.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.connections.lock().await.remove(&id);
        match removed {
            Some(mut connection) => {
                connection.close().await;
                true
            }
            None => false,
        }
    }

    /// Send `message` to every registered connection except `sender`
    ///
    /// A peer whose send fails is removed before the lock is released; the
    /// traversal carries on with the remaining peers.
    pub async fn broadcast(&self, sender: ConnectionId, message: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        {
            let mut connections = self.connections.lock().await;

            for (id, connection) in connections.iter_mut() {
                if *id == sender {
                    continue;
                }

                report.attempted += 1;
                match connection.send(message).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        warn!("Failed to send message to {}: {}", connection.info(), e);
                        report.dropped.push(*id);
                    }
                }
            }

            for id in &report.dropped {
                if let Some(connection) = connections.remove(id) {
                    dead.push(connection);
                }
            }

            info!("Current connections: {}", connections.len());
        }

        for mut connection in dead {
            connection.close().await;
        }

        report
    }

    /// Get current connection count
    pub async fn size(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    /// Registered ids in ascending order
    pub async fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }
}

// Thread-safe registry handle shared by the acceptor and every worker
pub type SharedRegistry = Arc<Registry>;

// Create a new empty shared registry
pub fn create_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}
