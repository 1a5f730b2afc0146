//! Per-Connection Read/Write Handler
//!
//! This module holds the state of one upload and the logic that moves bytes
//! from its socket to its output file. The same state machine serves both
//! servers: the reactor drives it with a non-blocking socket, one readiness
//! event at a time, and the blocking server drives it with a blocking socket
//! until end-of-stream.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Socket accepted
//!        │
//!        ▼
//! 2. Connection created (buffer in fill mode, no output file)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────────┐
//!    │   on_readable()                  │
//!    │                                  │
//!    │  ┌────────────────────────────┐  │
//!    │  │ Fill: read until would     │  │
//!    │  │ block, buffer full or EOF  │  │
//!    │  └─────────────┬──────────────┘  │
//!    │                ▼ flip            │
//!    │  ┌────────────────────────────┐  │
//!    │  │ Drain: decode header, open │  │
//!    │  │ file, write payload        │  │
//!    │  └─────────────┬──────────────┘  │
//!    │                ▼ compact         │
//!    │     [repeat while buffer was     │
//!    │      full, else return]          │
//!    └──────────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / error / shutdown
//!        │
//!        ▼
//! 5. close(): flush file, release socket, report
//! ```
//!
//! ## Ownership
//!
//! A `Connection` exclusively owns its socket, its buffer and, once the
//! header has been decoded, its output sink. [`Connection::close`] consumes
//! the connection, so every resource is released exactly once.

use crate::connection::buffer::ConnectionBuffer;
use crate::protocol::{FileHeader, HeaderDecoder};
use crate::storage::Storage;
use bytes::Buf;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Default per-connection buffer capacity (64 KB)
pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Statistics for transfer handling, shared by every connection of a server
#[derive(Debug, Default)]
pub struct TransferStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently open connections
    pub active_connections: AtomicU64,
    /// Output files opened after a header was decoded
    pub files_opened: AtomicU64,
    /// Transfers that reached end-of-stream with a decoded header
    pub transfers_completed: AtomicU64,
    /// Transfers that ended in an error or never completed their header
    pub transfers_failed: AtomicU64,
    /// Total bytes read from sockets, header included
    pub bytes_received: AtomicU64,
    /// Total payload bytes written to output files
    pub bytes_written: AtomicU64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn file_opened(&self) {
        self.files_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_completed(&self) {
        self.transfers_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_failed(&self) {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self, count: usize) {
        self.bytes_received
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a single connection.
///
/// None of these ever escape the connection they happened on.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Reading from the socket failed
    #[error("socket read failed: {0}")]
    Read(#[source] io::Error),

    /// The output file could not be opened
    #[error("cannot open output file {name:?}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Writing to (or flushing) the output file failed
    #[error("file write failed: {0}")]
    Write(#[source] io::Error),
}

/// What the connection expects after a readable event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The socket has no more data for now; wait for the next event
    Open,
    /// The peer closed the stream and every received byte was drained
    Closed,
}

/// Why a connection is being torn down.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed the stream
    EndOfStream,
    /// The server is shutting down
    Shutdown,
    /// A per-connection error
    Error(ConnectionError),
}

/// Terminal state of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Header decoded and the whole payload written
    Complete,
    /// The peer closed before the header was complete; no file was created
    Incomplete,
    /// The server shut down mid-transfer
    Interrupted,
    /// An I/O error ended the transfer
    Failed(String),
}

/// Summary produced once for every connection that is torn down.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub peer: SocketAddr,
    pub file: Option<FileHeader>,
    pub bytes_received: u64,
    pub bytes_written: u64,
    pub status: TransferStatus,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.status == TransferStatus::Complete
    }
}

/// Result of one fill pass over the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    WouldBlock,
    Full,
    Eof,
}

/// State of one upload.
///
/// `T` is the socket (anything readable) and `W` the output sink produced
/// by the server's [`Storage`].
pub struct Connection<T, W> {
    stream: T,
    peer: SocketAddr,
    buffer: ConnectionBuffer,
    decoder: HeaderDecoder,
    header: Option<FileHeader>,
    sink: Option<W>,
    bytes_received: u64,
    bytes_written: u64,
    stats: Arc<TransferStats>,
}

impl<T: Read, W: Write> Connection<T, W> {
    /// Creates the state for a freshly accepted socket.
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted socket
    /// * `peer` - The client's address (for logging and reports)
    /// * `capacity` - Size of the fixed receive buffer
    /// * `stats` - Shared transfer statistics
    pub fn new(stream: T, peer: SocketAddr, capacity: usize, stats: Arc<TransferStats>) -> Self {
        stats.connection_opened();

        Self {
            stream,
            peer,
            buffer: ConnectionBuffer::with_capacity(capacity),
            decoder: HeaderDecoder::new(),
            header: None,
            sink: None,
            bytes_received: 0,
            bytes_written: 0,
            stats,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The decoded header, once it has been fully received.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    pub fn is_header_resolved(&self) -> bool {
        self.decoder.is_resolved()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Mutable access to the socket, for (de)registration with a poller.
    pub fn stream_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    /// Handles a readable event.
    ///
    /// Reads everything the socket has to offer, decoding the header first
    /// if needed and writing payload to the output sink in arrival order.
    /// The buffer is cycled through fill and drain as many times as it takes
    /// for the socket to report that it would block.
    pub fn on_readable<S>(&mut self, storage: &mut S) -> Result<Progress, ConnectionError>
    where
        S: Storage<Sink = W>,
    {
        loop {
            let outcome = self.fill()?;

            self.buffer.flip();
            let drained = self.drain(storage);
            self.buffer.compact();
            drained?;

            match outcome {
                ReadOutcome::Full => continue,
                ReadOutcome::WouldBlock => return Ok(Progress::Open),
                ReadOutcome::Eof => return Ok(Progress::Closed),
            }
        }
    }

    /// Reads from the socket into the fill region.
    fn fill(&mut self) -> Result<ReadOutcome, ConnectionError> {
        loop {
            if self.buffer.is_full() {
                return Ok(ReadOutcome::Full);
            }

            match self.stream.read(self.buffer.fill_region()) {
                Ok(0) => {
                    debug!(client = %self.peer, "End of stream");
                    return Ok(ReadOutcome::Eof);
                }
                Ok(n) => {
                    self.buffer.commit(n);
                    self.bytes_received += n as u64;
                    self.stats.bytes_received(n);
                    trace!(client = %self.peer, bytes = n, "Read data");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::WouldBlock);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectionError::Read(e)),
            }
        }
    }

    /// Consumes the drain side: header first, then payload.
    fn drain<S>(&mut self, storage: &mut S) -> Result<(), ConnectionError>
    where
        S: Storage<Sink = W>,
    {
        if self.sink.is_none() {
            let Some(header) = self.decoder.decode(&mut self.buffer) else {
                trace!(
                    client = %self.peer,
                    buffered = self.buffer.remaining(),
                    state = ?self.decoder.state(),
                    "Incomplete header, need more data"
                );
                return Ok(());
            };

            let sink = storage
                .create(header.name())
                .map_err(|source| ConnectionError::Open {
                    name: header.to_string(),
                    source,
                })?;

            info!(client = %self.peer, file = %header, "Receiving file");
            self.stats.file_opened();
            self.header = Some(header);
            self.sink = Some(sink);
        }

        if let Some(sink) = self.sink.as_mut() {
            let pending = self.buffer.chunk();
            if pending.is_empty() {
                return Ok(());
            }

            // write_all retries short writes until the chunk is gone
            sink.write_all(pending).map_err(ConnectionError::Write)?;
            let n = pending.len();
            self.buffer.advance(n);
            self.bytes_written += n as u64;
            self.stats.bytes_written(n);
            trace!(client = %self.peer, bytes = n, "Wrote payload");
        }

        Ok(())
    }

    /// Tears the connection down and reports how the transfer ended.
    ///
    /// The output sink is flushed and dropped, then the socket is dropped.
    pub fn close(mut self, mut reason: CloseReason) -> TransferReport {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                if !matches!(reason, CloseReason::Error(_)) {
                    reason = CloseReason::Error(ConnectionError::Write(e));
                }
            }
        }

        let status = match reason {
            CloseReason::EndOfStream if self.header.is_some() => {
                info!(
                    client = %self.peer,
                    file = %self.header_display(),
                    bytes = self.bytes_written,
                    "File received"
                );
                self.stats.transfer_completed();
                TransferStatus::Complete
            }
            CloseReason::EndOfStream => {
                warn!(
                    client = %self.peer,
                    buffered = self.buffer.len(),
                    "Connection closed before the header was complete"
                );
                self.stats.transfer_failed();
                TransferStatus::Incomplete
            }
            CloseReason::Shutdown => {
                info!(
                    client = %self.peer,
                    bytes = self.bytes_written,
                    "Transfer interrupted by shutdown"
                );
                self.stats.transfer_failed();
                TransferStatus::Interrupted
            }
            CloseReason::Error(e) => {
                warn!(
                    client = %self.peer,
                    file = %self.header_display(),
                    error = %e,
                    "Transfer failed"
                );
                self.stats.transfer_failed();
                TransferStatus::Failed(e.to_string())
            }
        };

        self.stats.connection_closed();

        TransferReport {
            peer: self.peer,
            file: self.header.take(),
            bytes_received: self.bytes_received,
            bytes_written: self.bytes_written,
            status,
        }
    }

    fn header_display(&self) -> String {
        self.header
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}
