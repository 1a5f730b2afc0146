//! Server Module
//!
//! Two ways to receive files over the FlashFT protocol:
//!
//! - [`Server`]: a single-threaded reactor. One thread waits for socket
//!   readiness with `mio` and services every connection from there. This
//!   is the main server.
//! - [`BlockingServer`]: one OS thread per connection, each blocking on its
//!   socket until the upload ends.
//!
//! Both drive the same per-connection state machine
//! ([`Connection`](crate::connection::Connection)), so they agree on
//! framing, file creation and reporting.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Server (reactor)                      │
//! │                                                              │
//! │   ┌────────────┐   ready events   ┌───────────────────────┐  │
//! │   │ mio::Poll  │─────────────────>│ dispatch by Token     │  │
//! │   └────────────┘                  └───┬───────────┬───────┘  │
//! │                          Token(0)     │           │ Token(n) │
//! │                                       ▼           ▼          │
//! │                             ┌──────────────┐ ┌────────────┐  │
//! │                             │  Acceptor    │ │  Handler   │  │
//! │                             └──────┬───────┘ └─────┬──────┘  │
//! │                                    │ insert        │ remove  │
//! │                                    ▼               ▼         │
//! │                             ┌────────────────────────────┐   │
//! │                             │ Registry<Token, Connection>│   │
//! │                             └────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod blocking;
pub mod reactor;
pub mod registry;

use crate::connection::DEFAULT_BUFFER_CAPACITY;
use crate::protocol::MAX_HEADER_LEN;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

// Re-export commonly used types
pub use blocking::BlockingServer;
pub use reactor::{Server, ShutdownHandle};
pub use registry::Registry;

/// Smallest buffer that can always hold a complete header
pub const MIN_BUFFER_CAPACITY: usize = MAX_HEADER_LEN;

/// Default number of readiness events fetched per poll
pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// How long a server waits before retrying after a hard accept failure
pub const ACCEPT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Accept errors that only affect the connection being accepted.
pub(crate) fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Errors that prevent a server from starting or running.
///
/// These are fatal: per-connection failures never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("cannot bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The listening socket could not be configured
    #[error("cannot configure listener: {0}")]
    Listener(#[source] io::Error),

    /// The readiness poller (or its waker) could not be created
    #[error("cannot create poller: {0}")]
    Poll(#[source] io::Error),

    /// The listener could not be registered with the poller
    #[error("cannot register listener: {0}")]
    Register(#[source] io::Error),

    /// Waiting for readiness failed
    #[error("poll failed: {0}")]
    Wait(#[source] io::Error),

    /// The configured buffer cannot hold a maximal header
    #[error("buffer capacity {capacity} is below the minimum of {min}")]
    BufferTooSmall { capacity: usize, min: usize },
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
    /// Receive buffer size allocated for every connection
    pub buffer_capacity: usize,
    /// Maximum readiness events handled per poll
    pub events_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, crate::DEFAULT_PORT)),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration for `addr` with default buffer sizes.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity;
        self
    }

    /// Checks that every connection buffer can hold a full header.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(ServerError::BufferTooSmall {
                capacity: self.buffer_capacity,
                min: MIN_BUFFER_CAPACITY,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.port(), crate::DEFAULT_PORT);
        assert_eq!(config.buffer_capacity, 64 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_buffer_accepted() {
        let config = ServerConfig::default().with_buffer_capacity(MIN_BUFFER_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transient_accept_errors() {
        assert!(is_transient(&io::ErrorKind::ConnectionAborted.into()));
        assert!(is_transient(&io::ErrorKind::Interrupted.into()));
        assert!(!is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::ErrorKind::PermissionDenied.into()));
    }

    #[test]
    fn test_small_buffer_rejected() {
        let config = ServerConfig::default().with_buffer_capacity(255);
        assert!(matches!(
            config.validate(),
            Err(ServerError::BufferTooSmall { capacity: 255, min: 256 })
        ));
    }
}
