//! FlashFT Wire Protocol
//!
//! This module implements the framing used by every FlashFT transfer.
//!
//! ## Overview
//!
//! A transfer is one connection carrying one file. The sender writes a
//! one-byte filename length, the filename bytes, then the raw file
//! contents, and closes the connection to mark the end of the file.
//! There are no acknowledgements and no further framing.
//!
//! ## Modules
//!
//! - `types`: Defines `FileHeader` and its encoding
//! - `parser`: Incremental decoder for headers arriving in pieces
//!
//! ## Example
//!
//! ```
//! use flashft::protocol::{FileHeader, HeaderDecoder};
//!
//! // Sending side
//! let header = FileHeader::new("report.csv").unwrap();
//! let wire = header.encode();
//!
//! // Receiving side
//! let mut decoder = HeaderDecoder::new();
//! let mut input = &wire[..];
//! assert_eq!(decoder.decode(&mut input), Some(header));
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{DecodeState, HeaderDecoder};
pub use types::{FileHeader, HeaderError, MAX_HEADER_LEN, MAX_NAME_LEN};
