//! Storage Module
//!
//! This module is the seam between a decoded header and the place the
//! payload ends up. Servers never open files themselves: once a header is
//! resolved they ask a [`Storage`] for a sink and stream the payload into it.
//!
//! ## Backends
//!
//! ```text
//!                 ┌───────────────────────┐
//!   FileHeader ──>│   Storage::create()   │──> Sink (impl Write)
//!                 └───────────┬───────────┘
//!                             │
//!              ┌──────────────┴──────────────┐
//!              ▼                             ▼
//!      ┌───────────────┐             ┌───────────────┐
//!      │  DirStorage   │             │ MemoryStorage │
//!      │ files on disk │             │ in-process map│
//!      └───────────────┘             └───────────────┘
//! ```
//!
//! ## Semantics
//!
//! - `create` has create-or-truncate semantics: a second upload under the
//!   same name replaces the first.
//! - Names are raw bytes and are not validated. An empty name is passed
//!   through untouched; whether it can be stored is up to the backend.
//!
//! ## Example
//!
//! ```
//! use flashft::storage::{MemoryStorage, Storage};
//! use std::io::Write;
//!
//! let mut storage = MemoryStorage::new();
//! let mut sink = storage.create(b"notes.txt").unwrap();
//! sink.write_all(b"hello").unwrap();
//!
//! assert_eq!(storage.get(b"notes.txt"), Some(b"hello".to_vec()));
//! ```

pub mod dir;
pub mod memory;

use std::io::{self, Write};

// Re-export commonly used types
pub use dir::DirStorage;
pub use memory::{MemorySink, MemoryStorage};

/// A destination for received files.
pub trait Storage {
    /// Writable handle bound to one received file.
    type Sink: Write;

    /// Opens (creating or truncating) the file called `name`.
    fn create(&mut self, name: &[u8]) -> io::Result<Self::Sink>;
}
