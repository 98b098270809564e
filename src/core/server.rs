//! Acceptor loop: binds the listener and hands each accepted connection to
//! the registry and a fresh worker

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::config::ServerConfig;
use crate::core::connection::{Connection, ConnectionId};
use crate::core::registry::{create_registry, SharedRegistry};
use crate::core::worker_pool::WorkerPool;
use crate::error::{Result, RustyRelayError};

/// Listening relay server
#[derive(Debug)]
pub struct RelayServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: SharedRegistry,
    next_id: u64,
}

impl RelayServer {
    /// Bind and listen with a fresh, empty registry
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with_registry(config, create_registry()).await
    }

    /// Bind and listen, registering connections into `registry`
    ///
    /// The socket family follows the configured host address. Any failure
    /// here is fatal: the server never starts accepting.
    pub async fn bind_with_registry(config: ServerConfig, registry: SharedRegistry) -> Result<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| RustyRelayError::Bind(format!("cannot create socket: {}", e)))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| RustyRelayError::Bind(format!("cannot set SO_REUSEADDR: {}", e)))?;
        socket
            .bind(addr)
            .map_err(|e| RustyRelayError::Bind(format!("{}: {}", addr, e)))?;

        let listener = socket
            .listen(config.backlog)
            .map_err(|e| RustyRelayError::Listen(format!("{}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RustyRelayError::Listen(format!("cannot read local address: {}", e)))?;

        info!("Server is listening on port {}", local_addr.port());

        Ok(Self {
            config,
            listener,
            local_addr,
            registry,
            next_id: 1,
        })
    }

    /// Address actually bound, useful when the configured port is 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Accept connections forever
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then stop every worker
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut workers = WorkerPool::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => {
                    self.handle_accepted(accepted, &mut workers).await;
                }
            }

            workers.reap();
        }

        workers.shutdown().await;
        info!("Server on {} stopped", self.local_addr);
    }

    // A failed accept is never fatal: log it, pause, and let the loop go on
    async fn handle_accepted(
        &mut self,
        accepted: io::Result<(TcpStream, SocketAddr)>,
        workers: &mut WorkerPool,
    ) {
        match accepted {
            Ok((stream, peer_addr)) => self.admit(stream, peer_addr, workers).await,
            Err(e) => {
                error!("{}", RustyRelayError::Accept(e.to_string()));
                tokio::time::sleep(self.config.accept_backoff).await;
            }
        }
    }

    // Connection, then registration, then worker: a worker never sees an
    // unregistered connection
    async fn admit(&mut self, stream: TcpStream, peer_addr: SocketAddr, workers: &mut WorkerPool) {
        let id = self.next_connection_id();
        let (connection, reader) = Connection::accept(stream, peer_addr, id, self.config.buffer_size);
        info!("New connection: {}", connection.info());

        if let Err(e) = self.registry.insert(connection).await {
            error!("Failed to register connection {}: {}", peer_addr, e);
            return;
        }

        workers.spawn(reader, Arc::clone(&self.registry));
    }

    fn next_connection_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }
}
