//! Connection Module
//!
//! This module manages the state of individual uploads. Every accepted
//! socket gets one [`Connection`], which owns the socket, a fixed-size
//! receive buffer and, once the header arrives, the output file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Connection                              │
//! │                                                             │
//! │  socket ──read──> ConnectionBuffer ──drain──┐               │
//! │                   (fill │ drain)            │               │
//! │                                             ▼               │
//! │                               ┌──────────────────────┐      │
//! │                               │ HeaderDecoder        │      │
//! │                               │ (until resolved)     │      │
//! │                               └──────────┬───────────┘      │
//! │                                          ▼                  │
//! │                               ┌──────────────────────┐      │
//! │                               │ Storage sink (file)  │      │
//! │                               └──────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Fixed Buffers**: One buffer per connection, sized at accept time
//! - **Incremental Framing**: Headers may arrive in any number of pieces
//! - **Single Teardown**: `close()` consumes the connection and reports
//! - **Statistics**: Tracks connection and transfer metrics

pub mod buffer;
pub mod handler;

// Re-export commonly used types
pub use buffer::{ConnectionBuffer, Mode};
pub use handler::{
    CloseReason, Connection, ConnectionError, Progress, TransferReport, TransferStats,
    TransferStatus, DEFAULT_BUFFER_CAPACITY,
};
