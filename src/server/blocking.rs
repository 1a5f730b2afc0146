//! Thread-Per-Connection Server
//!
//! The simple way to receive files: block on `accept`, hand every socket to
//! its own OS thread, and let that thread block on reads until the sender
//! closes. Each worker drives the same [`Connection`] state machine as the
//! reactor; with a blocking socket a single `on_readable` call simply runs
//! until end-of-stream.
//!
//! Useful as a baseline and for a handful of clients. For many concurrent
//! uploads use the reactor ([`Server`](crate::server::Server)).

use crate::connection::{CloseReason, Connection, Progress, TransferReport, TransferStats};
use crate::server::{is_transient, ServerConfig, ServerError, ACCEPT_RETRY_INTERVAL};
use crate::storage::Storage;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Receives uploads with one thread per connection.
pub struct BlockingServer<S> {
    listener: TcpListener,
    storage: S,
    buffer_capacity: usize,
    stats: Arc<TransferStats>,
}

impl<S> BlockingServer<S>
where
    S: Storage + Clone + Send + 'static,
{
    /// Binds a blocking listener to `config.addr`.
    pub fn bind(config: ServerConfig, storage: S) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(config.addr).map_err(|source| ServerError::Bind {
            addr: config.addr,
            source,
        })?;
        Self::from_listener(listener, config, storage)
    }

    /// Starts from an already bound listener, which is put in blocking mode.
    pub fn from_listener(
        listener: TcpListener,
        config: ServerConfig,
        storage: S,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        listener
            .set_nonblocking(false)
            .map_err(ServerError::Listener)?;

        Ok(Self {
            listener,
            storage,
            buffer_capacity: config.buffer_capacity,
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

    /// Accepts connections forever, spawning a worker thread for each.
    ///
    /// Accept and spawn failures are logged and skipped.
    pub fn run(self) {
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "Blocking server listening"),
            Err(e) => warn!(error = %e, "Blocking server listening on unknown address"),
        }

        for incoming in self.listener.incoming() {
            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) if is_transient(&e) => {
                    debug!(error = %e, "Transient accept error");
                    continue;
                }
                Err(e) => {
                    // e.g. out of file descriptors; give workers time to finish
                    warn!(error = %e, "Failed to accept connection, backing off");
                    thread::sleep(ACCEPT_RETRY_INTERVAL);
                    continue;
                }
            };

            let peer = match stream.peer_addr() {
                Ok(peer) => peer,
                Err(e) => {
                    warn!(error = %e, "Dropping connection without peer address");
                    continue;
                }
            };
            info!(client = %peer, "Client connected");

            let storage = self.storage.clone();
            let stats = Arc::clone(&self.stats);
            let capacity = self.buffer_capacity;
            let spawned = thread::Builder::new()
                .name(format!("flashft-{}", peer))
                .spawn(move || receive(stream, peer, storage, capacity, stats));

            if let Err(e) = spawned {
                warn!(client = %peer, error = %e, "Failed to spawn worker thread");
            }
        }
    }
}

/// Receives one upload on a blocking socket, start to finish.
pub fn receive<S: Storage>(
    stream: TcpStream,
    peer: SocketAddr,
    mut storage: S,
    capacity: usize,
    stats: Arc<TransferStats>,
) -> TransferReport {
    let mut connection = Connection::new(stream, peer, capacity, stats);

    let reason = loop {
        match connection.on_readable(&mut storage) {
            Ok(Progress::Closed) => break CloseReason::EndOfStream,
            // only reachable if a read timeout was set on the socket
            Ok(Progress::Open) => continue,
            Err(e) => break CloseReason::Error(e),
        }
    };

    connection.close(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client;
    use crate::connection::TransferStatus;
    use crate::storage::DirStorage;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn start(dir: &std::path::Path) -> (SocketAddr, Arc<TransferStats>) {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap());
        let server = BlockingServer::bind(config, DirStorage::new(dir)).unwrap();
        let addr = server.local_addr().unwrap();
        let stats = server.stats();
        thread::spawn(move || server.run());
        (addr, stats)
    }

    fn wait_for(stats: &TransferStats, finished: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let done = stats.transfers_completed.load(Ordering::Relaxed)
                + stats.transfers_failed.load(Ordering::Relaxed);
            if done >= finished {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for transfers");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[tokio::test]
    async fn test_blocking_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, stats) = start(dir.path());

        let summary = client::send_reader(addr, "a.txt", &mut &b"hello"[..])
            .await
            .unwrap();
        assert_eq!(summary.payload_bytes, 5);

        wait_for(&stats, 1);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_blocking_concurrent_transfers() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, stats) = start(dir.path());

        let (mut a, mut b) = (&b"AAA"[..], &b"BBB"[..]);
        let one = client::send_reader(addr, "one", &mut a);
        let two = client::send_reader(addr, "two", &mut b);
        let (one, two) = tokio::join!(one, two);
        one.unwrap();
        two.unwrap();

        wait_for(&stats, 2);
        assert_eq!(std::fs::read(dir.path().join("one")).unwrap(), b"AAA");
        assert_eq!(std::fs::read(dir.path().join("two")).unwrap(), b"BBB");
    }

    #[test]
    fn test_receive_incomplete_header() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"\x09short").unwrap();
        });

        let (stream, peer) = listener.accept().unwrap();
        let report = receive(
            stream,
            peer,
            DirStorage::new(dir.path()),
            1024,
            Arc::new(TransferStats::new()),
        );
        sender.join().unwrap();

        assert_eq!(report.status, TransferStatus::Incomplete);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_receive_payload_larger_than_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 241) as u8).collect();
        let expected = payload.clone();
        let sender = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"\x07big.bin").unwrap();
            stream.write_all(&payload).unwrap();
        });

        let (stream, peer) = listener.accept().unwrap();
        let report = receive(
            stream,
            peer,
            DirStorage::new(dir.path()),
            256,
            Arc::new(TransferStats::new()),
        );
        sender.join().unwrap();

        assert!(report.is_complete());
        assert_eq!(std::fs::read(dir.path().join("big.bin")).unwrap(), expected);
    }
}
