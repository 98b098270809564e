//! Per-connection receive and broadcast loop

use log::{debug, info};
use tokio::sync::watch;

use crate::core::connection::{ConnectionId, ConnectionReader, Received};
use crate::core::registry::SharedRegistry;

/// Where a worker is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    Receiving,
    Broadcasting(Vec<u8>),
    Terminated,
}

/// Drives one connection: receive, broadcast, repeat until the peer leaves
///
/// The worker owns only the receive side of its connection. It reaches its
/// registry entry through the connection id.
#[derive(Debug)]
pub struct ConnectionWorker {
    reader: ConnectionReader,
    registry: SharedRegistry,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionWorker {
    pub fn new(
        reader: ConnectionReader,
        registry: SharedRegistry,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            reader,
            registry,
            shutdown,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.reader.id()
    }

    /// Run until the peer disconnects or shutdown is signalled
    pub async fn run(mut self) -> ConnectionId {
        let mut state = WorkerState::Running;

        loop {
            state = match state {
                WorkerState::Running => WorkerState::Receiving,
                WorkerState::Receiving => self.receive_next().await,
                WorkerState::Broadcasting(message) => self.broadcast(&message).await,
                WorkerState::Terminated => break,
            };
        }

        debug!("Worker for {} terminated", self.reader.peer_addr());
        self.id()
    }

    async fn receive_next(&mut self) -> WorkerState {
        let received = tokio::select! {
            received = self.reader.receive() => received,
            _ = shutdown_requested(&mut self.shutdown) => {
                debug!("Shutdown requested for {}", self.reader.peer_addr());
                Received::Closed
            }
        };

        match received {
            Received::Data(message) => WorkerState::Broadcasting(message),
            Received::Closed => {
                self.registry.remove(self.id()).await;
                WorkerState::Terminated
            }
        }
    }

    async fn broadcast(&mut self, message: &[u8]) -> WorkerState {
        // A broadcaster that failed to write to us has already removed us
        if !self.registry.contains(self.id()).await {
            debug!(
                "{} is no longer registered, dropping its message",
                self.reader.peer_addr()
            );
            return WorkerState::Terminated;
        }

        info!(
            "Message from {}: {}",
            self.reader.peer_addr(),
            String::from_utf8_lossy(message)
        );

        let report = self.registry.broadcast(self.id(), message).await;
        debug!(
            "Broadcast from {} delivered to {}/{} peers",
            self.id(),
            report.delivered,
            report.attempted
        );
        WorkerState::Receiving
    }
}

// Resolves once `true` is published; never resolves if the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let sender_gone = shutdown.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}
