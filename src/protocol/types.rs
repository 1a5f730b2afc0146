//! Transfer Header Types
//!
//! This module defines the single frame of the FlashFT wire protocol:
//! a one-byte filename length followed by the filename bytes. Everything
//! after the header is raw payload, and the connection close marks the
//! end of the file.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────┬──────────────────┬──────────────────────────────┐
//! │ len: u8  │ name: [u8; len]  │ payload ... (until EOF)      │
//! └──────────┴──────────────────┴──────────────────────────────┘
//!   offset 0   offset 1..=len     offset len+1..
//! ```
//!
//! ## Examples
//!
//! Header for `a.txt`: `\x05a.txt`
//! Header for an empty name: `\x00`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 1;

/// Longest filename the one-byte length prefix can describe
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Longest possible encoded header (prefix plus a maximal name)
pub const MAX_HEADER_LEN: usize = LENGTH_PREFIX_SIZE + MAX_NAME_LEN;

/// Errors raised while building a header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The filename does not fit in the one-byte length prefix
    #[error("file name too long: {len} bytes (max: 255)")]
    NameTooLong { len: usize },
}

/// The header that opens every transfer.
///
/// The filename is carried as raw bytes. No escaping or validation is
/// applied; an empty name is a legal header.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FileHeader {
    name: Bytes,
}

impl FileHeader {
    /// Creates a header, rejecting names longer than [`MAX_NAME_LEN`].
    ///
    /// # Example
    /// ```
    /// use flashft::protocol::FileHeader;
    /// let header = FileHeader::new("a.txt").unwrap();
    /// assert_eq!(header.name(), b"a.txt");
    /// ```
    pub fn new(name: impl Into<Bytes>) -> Result<Self, HeaderError> {
        let name = name.into();
        if name.len() > MAX_NAME_LEN {
            return Err(HeaderError::NameTooLong { len: name.len() });
        }
        Ok(Self { name })
    }

    /// Builds a header from bytes already known to fit.
    pub(crate) fn from_wire(name: Bytes) -> Self {
        debug_assert!(name.len() <= MAX_NAME_LEN);
        Self { name }
    }

    /// Raw filename bytes.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Length of the filename, as carried in the prefix byte.
    pub fn name_len(&self) -> u8 {
        self.name.len() as u8
    }

    /// Number of bytes this header occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.name.len()
    }

    /// Serializes the header into wire format.
    ///
    /// # Example
    /// ```
    /// use flashft::protocol::FileHeader;
    /// let header = FileHeader::new("a.txt").unwrap();
    /// assert_eq!(&header.encode()[..], b"\x05a.txt");
    /// ```
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.name_len());
        buf.put_slice(&self.name);
        buf.freeze()
    }

    /// Interprets the filename as a relative filesystem path.
    ///
    /// On Unix the bytes are used verbatim. Elsewhere they are decoded as
    /// UTF-8, replacing invalid sequences.
    pub fn to_path(&self) -> PathBuf {
        name_to_path(&self.name)
    }
}

/// Converts raw filename bytes into a path.
#[cfg(unix)]
pub fn name_to_path(name: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    PathBuf::from(OsStr::from_bytes(name))
}

/// Converts raw filename bytes into a path.
#[cfg(not(unix))]
pub fn name_to_path(name: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(name).into_owned())
}

impl fmt::Debug for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHeader")
            .field("name", &String::from_utf8_lossy(&self.name))
            .finish()
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.name))
    }
}
