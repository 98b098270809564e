//! Relay connection management
//! Handles the lifecycle of accepted client connections
//!
//! An accepted stream is split in two. The send side ([`Connection`]) is
//! owned by the registry and written to by whichever worker is
//! broadcasting. The receive side ([`ConnectionReader`]) is owned by the
//! connection's own worker. Both carry the same [`ConnectionId`], which is
//! how a worker refers back to its registry entry.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::Result;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Registry key of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of a single receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Between one byte and the buffer capacity
    Data(Vec<u8>),
    /// Peer closed the stream or the read failed
    Closed,
}

/// Send side of a client connection
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    writer: Option<BoxedWriter>,
}

impl Connection {
    /// Split an accepted TCP stream into its registry and worker halves
    pub fn accept(
        stream: TcpStream,
        peer_addr: SocketAddr,
        id: ConnectionId,
        buffer_size: usize,
    ) -> (Connection, ConnectionReader) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }

        let (reader, writer) = stream.into_split();
        Self::from_parts(id, peer_addr, Box::new(reader), Box::new(writer), buffer_size)
    }

    /// Same as [`Connection::accept`] for any bidirectional byte stream
    pub fn from_io<T>(
        io: T,
        peer_addr: SocketAddr,
        id: ConnectionId,
        buffer_size: usize,
    ) -> (Connection, ConnectionReader)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::from_parts(id, peer_addr, Box::new(reader), Box::new(writer), buffer_size)
    }

    fn from_parts(
        id: ConnectionId,
        peer_addr: SocketAddr,
        reader: BoxedReader,
        writer: BoxedWriter,
        buffer_size: usize,
    ) -> (Connection, ConnectionReader) {
        let connection = Connection {
            id,
            peer_addr,
            connected_at: Utc::now(),
            writer: Some(writer),
        };
        let reader = ConnectionReader {
            id,
            peer_addr,
            reader,
            buffer: vec![0; buffer_size],
        };
        (connection, reader)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Peer address as `host:port`
    pub fn info(&self) -> String {
        self.peer_addr.to_string()
    }

    pub fn is_valid(&self) -> bool {
        self.writer.is_some()
    }

    /// Write the whole message to the peer
    ///
    /// Sending on a closed connection does nothing. A transport failure is
    /// returned to the caller, which decides whether the peer is dead.
    pub async fn send(&mut self, message: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        writer.write_all(message).await?;
        Ok(())
    }

    /// Shut down the send side; later calls are no-ops
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of {} reported: {}", self.peer_addr, e);
            }
            self.log_closed();
        }
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }

    fn log_closed(&self) {
        info!(
            "Connection closed: {} (open for {}s)",
            self.info(),
            self.connection_duration().num_seconds()
        );
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Dropping the writer releases the send side of the transport
        if self.writer.take().is_some() {
            self.log_closed();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("connected_at", &self.connected_at)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Receive side of a client connection, owned by its worker
pub struct ConnectionReader {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: BoxedReader,
    buffer: Vec<u8>,
}

impl ConnectionReader {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Maximum bytes a single receive can return
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Wait for the next chunk of bytes from the peer
    ///
    /// Anything beyond the buffer capacity stays in the transport and is
    /// returned by later calls. Read errors are reported as `Closed`.
    pub async fn receive(&mut self) -> Received {
        self.buffer.fill(0);

        match self.reader.read(&mut self.buffer).await {
            Ok(0) => Received::Closed,
            Ok(n) => Received::Data(self.buffer[..n].to_vec()),
            Err(e) => {
                debug!("Receive from {} failed: {}", self.peer_addr, e);
                Received::Closed
            }
        }
    }
}

impl fmt::Debug for ConnectionReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionReader")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("capacity", &self.capacity())
            .finish()
    }
}
