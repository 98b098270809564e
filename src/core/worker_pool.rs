//! Supervision of connection workers
//!
//! Every worker spawned by the acceptor is tracked here, so finished workers
//! can be reaped and the remaining ones told to stop and awaited.

use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::core::connection::{ConnectionId, ConnectionReader};
use crate::core::registry::SharedRegistry;
use crate::core::worker::ConnectionWorker;

/// Set of running connection workers
#[derive(Debug)]
pub struct WorkerPool {
    /// Running workers, each resolving to the id it served
    workers: JoinSet<ConnectionId>,
    /// Flipped to `true` once to ask every worker to stop
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            workers: JoinSet::new(),
            shutdown_tx,
        }
    }

    /// Start a worker for an already registered connection
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&mut self, reader: ConnectionReader, registry: SharedRegistry) {
        let worker = ConnectionWorker::new(reader, registry, self.shutdown_tx.subscribe());
        self.workers.spawn(worker.run());
    }

    /// Collect workers that have already finished, without waiting
    ///
    /// # Returns
    /// The number of workers collected
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(result) = self.workers.try_join_next() {
            log_exit(result);
            reaped += 1;
        }
        reaped
    }

    /// Number of workers spawned and not yet reaped
    pub fn active_count(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to stop and wait for all of them
    ///
    /// A worker blocked inside a broadcast finishes that broadcast first.
    pub async fn shutdown(mut self) {
        info!("Stopping {} connection workers", self.workers.len());

        // Receivers may all be gone already; nothing to signal then
        let _ = self.shutdown_tx.send(true);

        while let Some(result) = self.workers.join_next().await {
            log_exit(result);
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

fn log_exit(result: Result<ConnectionId, tokio::task::JoinError>) {
    match result {
        Ok(id) => debug!("Reaped worker for connection {}", id),
        Err(e) => error!("Connection worker failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::Connection;
    use crate::core::registry::create_registry;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_reap_and_shutdown() {
        let registry = create_registry();
        let mut pool = WorkerPool::new();

        let mut clients = Vec::new();
        for raw in 1..=3 {
            let (client, server) = duplex(1024);
            let peer = format!("127.0.0.1:{}", 42000 + raw).parse().unwrap();
            let (connection, reader) =
                Connection::from_io(server, peer, ConnectionId::new(raw), 1024);
            registry.insert(connection).await.unwrap();
            pool.spawn(reader, registry.clone());
            clients.push(client);
        }
        assert_eq!(pool.active_count(), 3);

        // One peer leaves on its own
        drop(clients.remove(0));
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.size().await != 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.reap() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pool.active_count(), 2);

        tokio::time::timeout(Duration::from_secs(5), pool.shutdown())
            .await
            .unwrap();
        assert_eq!(registry.size().await, 0);
    }
}
