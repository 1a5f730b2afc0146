//! # FlashFT - A Minimal Single-File Transfer Server
//!
//! FlashFT moves one file per TCP connection from a sender to a receiver.
//! The protocol is as small as it gets: a one-byte filename length, the
//! filename, then the raw file bytes until the sender closes the connection.
//! The interesting part is the receiver, which services many concurrent
//! uploads from a single thread.
//!
//! ## Features
//!
//! - **Single-Threaded Reactor**: One `mio` event loop handles every upload
//! - **Incremental Framing**: Headers may arrive split across any number of reads
//! - **Fixed Buffers**: Each connection cycles one fixed-size buffer between
//!   filling from the socket and draining into its file
//! - **Blocking Mode**: A thread-per-connection server for comparison
//! - **Async Client**: A Tokio-based sender
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashFT                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  mio Poll   │───>│  Reactor    │───>│ Connection  │                  │
//! │  │ (readiness) │    │  (Server)   │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌─────────────┐    ┌──────────┐  │
//! │                     │  Registry   │    │   Header    │───>│ Storage  │  │
//! │                     │ Token->Conn │    │   Decoder   │    │ (files)  │  │
//! │                     └─────────────┘    └─────────────┘    └──────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashft::server::{Server, ServerConfig};
//! use flashft::storage::DirStorage;
//!
//! fn main() -> Result<(), flashft::server::ServerError> {
//!     let config = ServerConfig::new("127.0.0.1:7878".parse().unwrap());
//!     let mut server = Server::bind(config, DirStorage::new("incoming"))?;
//!
//!     // Blocks until a ShutdownHandle is triggered
//!     server.run()
//! }
//! ```
//!
//! And from another process:
//!
//! ```no_run
//! # async fn demo() -> Result<(), flashft::client::ClientError> {
//! flashft::client::send_file("127.0.0.1:7878", "photo.jpg").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Wire Protocol
//!
//! | Offset     | Field            | Encoding                          |
//! |------------|------------------|-----------------------------------|
//! | 0          | filename length  | 1 unsigned byte, 0-255            |
//! | 1..=L      | filename         | `L` raw bytes                     |
//! | L+1..EOF   | payload          | raw bytes, ended by close         |
//!
//! ## Module Overview
//!
//! - [`protocol`]: Header type and incremental decoder
//! - [`connection`]: Per-connection buffer, state machine and statistics
//! - [`server`]: The reactor, its registry, and the blocking server
//! - [`storage`]: Where received files are written
//! - [`client`]: The sending side
//!
//! ## Design Highlights
//!
//! ### One Thread, Many Uploads
//!
//! The reactor thread is the only thread that touches connection state.
//! It sleeps in `poll` until a socket is ready, services it, and sleeps
//! again. Output file writes are done synchronously on that thread.
//!
//! ### Fill/Drain Buffers
//!
//! Each connection owns a single fixed-size buffer with a read cursor and a
//! write cursor. Reads fill it, the decoder and file writer drain it, and a
//! compaction moves leftovers to the front. Payloads of any size flow
//! through buffers of a fixed size.
//!
//! ### Known Limitation
//!
//! There is no inactivity timeout: a peer that sends half a header and
//! then goes quiet occupies a connection slot until it disconnects.

pub mod client;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{send_file, send_reader, ClientError, TransferSummary};
pub use connection::{ConnectionError, TransferReport, TransferStats, TransferStatus};
pub use protocol::{FileHeader, HeaderDecoder, HeaderError};
pub use server::{BlockingServer, Server, ServerConfig, ServerError, ShutdownHandle};
pub use storage::{DirStorage, MemoryStorage, Storage};

/// The default port FlashFT listens on
pub const DEFAULT_PORT: u16 = 7878;

/// The default host FlashFT binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashFT
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
