//! Single-Threaded Reactor
//!
//! The non-blocking FlashFT server. One thread owns the poller, the
//! listener and every connection; it sleeps until the OS reports that some
//! socket is ready, services each ready socket to completion, and goes back
//! to sleep. No locks, no per-connection threads.
//!
//! ## Event Loop
//!
//! ```text
//!        ┌──────────────────────────────────────────┐
//!        │                                          │
//!        ▼                                          │
//!   poll.poll(events, timeout)                      │
//!        │                                          │
//!        ▼                                          │
//!   for each ready token ───────────────────────────┤
//!        │                                          │
//!        ├── LISTENER ──> accept until WouldBlock   │
//!        │                register READABLE         │
//!        │                                          │
//!        ├── WAKER ─────> (shutdown flag checked)   │
//!        │                                          │
//!        └── Token(n) ──> Connection::on_readable   │
//!                          ├─ Open   ──> keep ──────┘
//!                          ├─ Closed ──> teardown
//!                          └─ Err    ──> teardown
//! ```
//!
//! ## Notes
//!
//! - `mio` is edge-triggered: the acceptor and the handler both keep going
//!   until the socket reports `WouldBlock`, otherwise readiness is lost.
//! - Output file writes are synchronous and may block the loop briefly.
//! - A hard accept failure (for example running out of file descriptors)
//!   leaves connections in the backlog with no further edge. The acceptor
//!   remembers this and retries every `ACCEPT_RETRY_INTERVAL` until the
//!   backlog is drained.
//! - There is no inactivity timeout. A peer that stalls mid-header keeps
//!   its registry slot until it disconnects or the server shuts down.

use crate::connection::{CloseReason, Connection, Progress, TransferReport, TransferStats};
use crate::server::registry::{Registry, LISTENER, WAKER};
use crate::server::{is_transient, ServerConfig, ServerError, ACCEPT_RETRY_INTERVAL};
use crate::storage::Storage;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

type ReactorConnection<S> = Connection<TcpStream, <S as Storage>::Sink>;

/// Asks a running [`Server`] to stop.
///
/// Cheap to clone and safe to send to other threads (for example a signal
/// handler). Shutting down wakes the poller; the reactor then tears down
/// every open connection and `run` returns.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::Release);
        self.waker.wake()
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// The non-blocking, single-threaded FlashFT server.
pub struct Server<S: Storage> {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    stop: ShutdownHandle,
    /// Set when the last accept pass stopped before `WouldBlock`
    accept_pending: bool,
    connections: Registry<ReactorConnection<S>>,
    storage: S,
    config: ServerConfig,
    stats: Arc<TransferStats>,
}

impl<S: Storage> Server<S> {
    /// Binds a listener to `config.addr` and sets up the poller.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use flashft::server::{Server, ServerConfig};
    /// use flashft::storage::DirStorage;
    ///
    /// let config = ServerConfig::new("127.0.0.1:7878".parse().unwrap());
    /// let mut server = Server::bind(config, DirStorage::new("incoming")).unwrap();
    /// server.run().unwrap();
    /// ```
    pub fn bind(config: ServerConfig, storage: S) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(config.addr).map_err(|source| ServerError::Bind {
            addr: config.addr,
            source,
        })?;
        Self::with_listener(listener, config, storage)
    }

    /// Starts from an already bound listener.
    ///
    /// The listener is switched to non-blocking mode. `config.addr` is
    /// ignored.
    pub fn from_listener(
        listener: std::net::TcpListener,
        config: ServerConfig,
        storage: S,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        listener
            .set_nonblocking(true)
            .map_err(ServerError::Listener)?;
        Self::with_listener(TcpListener::from_std(listener), config, storage)
    }

    fn with_listener(
        mut listener: TcpListener,
        config: ServerConfig,
        storage: S,
    ) -> Result<Self, ServerError> {
        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Register)?;
        let waker = Waker::new(poll.registry(), WAKER).map_err(ServerError::Poll)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(config.events_capacity),
            listener,
            stop: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            accept_pending: false,
            connections: Registry::new(),
            storage,
            config,
            stats: Arc::new(TransferStats::new()),
        })
    }

    /// Shares statistics with an external observer.
    pub fn with_stats(mut self, stats: Arc<TransferStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<TransferStats> {
        Arc::clone(&self.stats)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Number of connections currently registered.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.stop.clone()
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// Each iteration waits without a timeout. Only setup-level failures of
    /// the poller are returned; connection failures are logged and absorbed.
    pub fn run(&mut self) -> Result<(), ServerError> {
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "Reactor listening"),
            Err(e) => warn!(error = %e, "Reactor listening on unknown address"),
        }

        while !self.stop.is_shutdown() {
            if let Err(e) = self.turn(None) {
                let closed = self.shutdown();
                error!(interrupted = closed.len(), "Reactor stopped after poll failure");
                return Err(e);
            }
        }

        let closed = self.shutdown();
        info!(interrupted = closed.len(), "Reactor stopped");
        Ok(())
    }

    /// Runs a single iteration of the event loop.
    ///
    /// Waits up to `timeout` (forever if `None`) for readiness, dispatches
    /// every ready event once, and returns the reports of connections that
    /// were torn down during this iteration.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<Vec<TransferReport>, ServerError> {
        let retry_accept = self.accept_pending;
        let timeout = if retry_accept {
            Some(timeout.map_or(ACCEPT_RETRY_INTERVAL, |t| t.min(ACCEPT_RETRY_INTERVAL)))
        } else {
            timeout
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => {
                error!(error = %e, "Readiness wait failed");
                return Err(ServerError::Wait(e));
            }
        }

        let ready: Vec<Token> = self.events.iter().map(|event| event.token()).collect();
        let mut reports = Vec::new();

        for &token in &ready {
            match token {
                LISTENER => self.accept(),
                WAKER => trace!("Reactor woken"),
                token => reports.extend(self.service(token)),
            }
        }

        if retry_accept && !ready.contains(&LISTENER) {
            self.accept();
        }

        Ok(reports)
    }

    /// Tears down every open connection, returning their reports.
    pub fn shutdown(&mut self) -> Vec<TransferReport> {
        if self.connections.is_empty() {
            return Vec::new();
        }

        self.connections
            .tokens()
            .into_iter()
            .filter_map(|token| self.teardown(token, CloseReason::Shutdown))
            .collect()
    }

    /// Accepts every pending connection.
    fn accept(&mut self) {
        self.accept_pending = false;
        loop {
            match self.listener.accept() {
                // mio hands out streams already in non-blocking mode
                Ok((mut stream, peer)) => {
                    let token = self.connections.next_token();
                    debug_assert!(!self.connections.contains(token));
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!(client = %peer, error = %e, "Failed to register connection");
                        continue;
                    }

                    info!(client = %peer, token = token.0, "Client connected");
                    let connection = Connection::new(
                        stream,
                        peer,
                        self.config.buffer_capacity,
                        Arc::clone(&self.stats),
                    );
                    self.connections.insert(token, connection);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    // the backlog may still hold connections that will get no new edge
                    error!(error = %e, "Failed to accept connection, will retry");
                    self.accept_pending = true;
                    break;
                }
            }
        }
    }

    /// Handles a readable event on an existing connection.
    fn service(&mut self, token: Token) -> Option<TransferReport> {
        let Some(connection) = self.connections.get_mut(token) else {
            trace!(token = token.0, "Event for unknown connection");
            return None;
        };

        let reason = match connection.on_readable(&mut self.storage) {
            Ok(Progress::Open) => return None,
            Ok(Progress::Closed) => CloseReason::EndOfStream,
            Err(e) => CloseReason::Error(e),
        };

        self.teardown(token, reason)
    }

    /// Removes a connection and releases its socket and file exactly once.
    fn teardown(&mut self, token: Token, reason: CloseReason) -> Option<TransferReport> {
        let mut connection = self.connections.remove(token)?;

        if let Err(e) = self.poll.registry().deregister(connection.stream_mut()) {
            debug!(token = token.0, error = %e, "Failed to deregister connection");
        }

        let report = connection.close(reason);
        debug!(
            client = %report.peer,
            received = report.bytes_received,
            written = report.bytes_written,
            "Connection closed"
        );
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client;
    use crate::connection::TransferStatus;
    use crate::server::MIN_BUFFER_CAPACITY;
    use crate::storage::{DirStorage, MemoryStorage};
    use std::io::Write;
    use std::thread;
    use std::time::Instant;

    fn local_config() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
    }

    /// Drives the reactor until `expected` connections have been torn down.
    fn drive<S: Storage>(server: &mut Server<S>, expected: usize) -> Vec<TransferReport> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut reports = Vec::new();
        while reports.len() < expected {
            assert!(Instant::now() < deadline, "timed out waiting for transfers");
            reports.extend(server.turn(Some(Duration::from_millis(20))).unwrap());
        }
        reports
    }

    /// Writes each chunk separately, pausing in between, then closes.
    fn send_chunks(
        addr: SocketAddr,
        chunks: Vec<Vec<u8>>,
        pause: Duration,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut stream = std::net::TcpStream::connect(addr).unwrap();
            stream.set_nodelay(true).unwrap();
            for chunk in chunks {
                stream.write_all(&chunk).unwrap();
                thread::sleep(pause);
            }
        })
    }

    #[test]
    fn test_single_delivery_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(local_config(), DirStorage::new(dir.path())).unwrap();
        let addr = server.local_addr().unwrap();

        let client = send_chunks(addr, vec![b"\x05a.txthello".to_vec()], Duration::ZERO);
        let reports = drive(&mut server, 1);
        client.join().unwrap();

        assert!(reports[0].is_complete());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_header_split_across_deliveries() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(local_config(), DirStorage::new(dir.path())).unwrap();
        let addr = server.local_addr().unwrap();

        let chunks = vec![
            b"\x05".to_vec(),
            b"a.".to_vec(),
            b"txt".to_vec(),
            b"hel".to_vec(),
            b"lo".to_vec(),
        ];
        let client = send_chunks(addr, chunks, Duration::from_millis(30));
        let reports = drive(&mut server, 1);
        client.join().unwrap();

        assert!(reports[0].is_complete());
        assert_eq!(reports[0].bytes_received, 11);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_concurrent_clients_get_separate_files() {
        let mut server = Server::bind(local_config(), MemoryStorage::new()).unwrap();
        let addr = server.local_addr().unwrap();

        let one = thread::spawn(move || {
            tokio_test::block_on(client::send_reader(addr, "one", &mut &b"AAA"[..])).unwrap()
        });
        let two = thread::spawn(move || {
            tokio_test::block_on(client::send_reader(addr, "two", &mut &b"BBB"[..])).unwrap()
        });

        let reports = drive(&mut server, 2);
        one.join().unwrap();
        two.join().unwrap();

        assert!(reports.iter().all(TransferReport::is_complete));
        assert_eq!(server.storage().get(b"one"), Some(b"AAA".to_vec()));
        assert_eq!(server.storage().get(b"two"), Some(b"BBB".to_vec()));
    }

    #[test]
    fn test_many_interleaved_uploads() {
        let mut server = Server::bind(local_config(), MemoryStorage::new()).unwrap();
        let addr = server.local_addr().unwrap();

        let clients: Vec<_> = (0..16u8)
            .map(|i| {
                let mut chunks = vec![vec![4], format!("f{:03}", i).into_bytes()];
                for _ in 0..5 {
                    chunks.push(vec![i; 100]);
                }
                send_chunks(addr, chunks, Duration::from_millis(5))
            })
            .collect();

        let reports = drive(&mut server, 16);
        for client in clients {
            client.join().unwrap();
        }

        assert!(reports.iter().all(TransferReport::is_complete));
        for i in 0..16u8 {
            let name = format!("f{:03}", i);
            assert_eq!(
                server.storage().get(name.as_bytes()),
                Some(vec![i; 500]),
                "file {}",
                name
            );
        }
    }

    #[test]
    fn test_payload_larger_than_buffer() {
        let config = local_config().with_buffer_capacity(MIN_BUFFER_CAPACITY);
        let mut server = Server::bind(config, MemoryStorage::new()).unwrap();
        let addr = server.local_addr().unwrap();

        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 253) as u8).collect();
        let expected = payload.clone();
        let client = thread::spawn(move || {
            tokio_test::block_on(client::send_reader(addr, "big.bin", &mut &payload[..])).unwrap()
        });

        let reports = drive(&mut server, 1);
        let summary = client.join().unwrap();

        assert_eq!(summary.payload_bytes, 1_000_000);
        assert_eq!(reports[0].bytes_written, 1_000_000);
        assert_eq!(server.storage().get(b"big.bin"), Some(expected));
    }

    #[test]
    fn test_header_then_close_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(local_config(), DirStorage::new(dir.path())).unwrap();
        let addr = server.local_addr().unwrap();

        let client = send_chunks(addr, vec![b"\x05a.txt".to_vec()], Duration::ZERO);
        let reports = drive(&mut server, 1);
        client.join().unwrap();

        assert!(reports[0].is_complete());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"");
    }

    #[test]
    fn test_zero_length_name() {
        let mut server = Server::bind(local_config(), MemoryStorage::new()).unwrap();
        let addr = server.local_addr().unwrap();

        let client = send_chunks(addr, vec![b"\x00payload".to_vec()], Duration::ZERO);
        let reports = drive(&mut server, 1);
        client.join().unwrap();

        assert!(reports[0].is_complete());
        assert_eq!(server.storage().get(b""), Some(b"payload".to_vec()));
    }

    #[test]
    fn test_zero_length_name_on_disk_fails_connection_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(local_config(), DirStorage::new(dir.path())).unwrap();
        let addr = server.local_addr().unwrap();

        let bad = send_chunks(addr, vec![b"\x00payload".to_vec()], Duration::ZERO);
        let reports = drive(&mut server, 1);
        bad.join().unwrap();
        assert!(matches!(reports[0].status, TransferStatus::Failed(_)));

        let good = send_chunks(addr, vec![b"\x02okfine".to_vec()], Duration::ZERO);
        let reports = drive(&mut server, 1);
        good.join().unwrap();
        assert!(reports[0].is_complete());
        assert_eq!(std::fs::read(dir.path().join("ok")).unwrap(), b"fine");
    }

    #[test]
    fn test_close_before_header_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(local_config(), DirStorage::new(dir.path())).unwrap();
        let addr = server.local_addr().unwrap();

        let client = send_chunks(addr, vec![b"\x05a.t".to_vec()], Duration::ZERO);
        let reports = drive(&mut server, 1);
        client.join().unwrap();

        assert_eq!(reports[0].status, TransferStatus::Incomplete);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(server.stats().files_opened.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_shutdown_interrupts_open_transfers() {
        let mut server = Server::bind(local_config(), MemoryStorage::new()).unwrap();
        let addr = server.local_addr().unwrap();

        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        stream.write_all(b"\x04slowpart").unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while server.stats().files_opened.load(Ordering::Relaxed) == 0 {
            assert!(Instant::now() < deadline, "header never arrived");
            server.turn(Some(Duration::from_millis(20))).unwrap();
        }

        let reports = server.shutdown();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, TransferStatus::Interrupted);
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.storage().get(b"slow"), Some(b"part".to_vec()));
        drop(stream);
    }

    #[test]
    fn test_shutdown_handle_stops_run() {
        let mut server = Server::bind(local_config(), MemoryStorage::new()).unwrap();
        let handle = server.shutdown_handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.shutdown().unwrap();
        });

        server.run().unwrap();
        stopper.join().unwrap();
        assert!(server.shutdown_handle().is_shutdown());
    }

    #[test]
    fn test_pending_accept_is_retried_without_new_event() {
        let mut server = Server::bind(local_config(), MemoryStorage::new()).unwrap();
        let addr = server.local_addr().unwrap();
        let _client = std::net::TcpStream::connect(addr).unwrap();

        // Swallow the listener edge without accepting, as a failed accept pass would
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            assert!(Instant::now() < deadline, "listener never became readable");
            server
                .poll
                .poll(&mut server.events, Some(Duration::from_millis(20)))
                .unwrap();
            if server.events.iter().any(|event| event.token() == LISTENER) {
                break;
            }
        }
        server.accept_pending = true;

        server.turn(None).unwrap();

        assert_eq!(server.connection_count(), 1);
        assert!(!server.accept_pending);
    }

    #[test]
    fn test_from_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut server =
            Server::from_listener(listener, ServerConfig::default(), MemoryStorage::new()).unwrap();

        assert_eq!(server.local_addr().unwrap(), addr);

        let client = send_chunks(addr, vec![b"\x01xy".to_vec()], Duration::ZERO);
        drive(&mut server, 1);
        client.join().unwrap();
        assert_eq!(server.storage().get(b"x"), Some(b"y".to_vec()));
    }

    #[test]
    fn test_bind_conflict_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ServerConfig::new(taken.local_addr().unwrap());

        let result = Server::bind(config, MemoryStorage::new());
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[test]
    fn test_small_buffer_is_rejected() {
        let config = local_config().with_buffer_capacity(16);
        let result = Server::bind(config, MemoryStorage::new());
        assert!(matches!(result, Err(ServerError::BufferTooSmall { .. })));
    }
}
