use std::error::Error;
use std::fmt;
use std::io;

use crate::core::connection::ConnectionId;

#[derive(Debug)]
pub enum RustyRelayError {
    // Transport setup errors
    Bind(String),
    Listen(String),
    Accept(String),

    // Connections errors
    ConnectionError(String),

    // Registry errors
    DuplicateId(ConnectionId),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for RustyRelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind(msg) => write!(f, "Bind error: {}", msg),
            Self::Listen(msg) => write!(f, "Listen error: {}", msg),
            Self::Accept(msg) => write!(f, "Accept error: {}", msg),
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::DuplicateId(id) => write!(f, "Connection id already registered: {}", id),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RustyRelayError {}

impl From<io::Error> for RustyRelayError {
    fn from(err: io::Error) -> Self {
        RustyRelayError::ConnectionError(err.to_string())
    }
}

// Generic result type for RustyRelay
pub type Result<T> = std::result::Result<T, RustyRelayError>;
