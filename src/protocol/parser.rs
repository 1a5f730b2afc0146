//! Incremental Header Decoder
//!
//! Sockets hand us whatever bytes happen to have arrived, so the header may
//! show up in any number of pieces: the length byte alone, half the name,
//! or the whole header glued to the first chunk of payload. The decoder is
//! a small state machine that is re-driven every time new bytes land.
//!
//! ## States
//!
//! ```text
//!   ┌────────────────┐  ≥1 byte   ┌──────────────────┐  ≥1+L bytes  ┌──────────┐
//!   │ AwaitingLength │──────────>│ AwaitingName(L)  │────────────>│ Resolved │
//!   └────────────────┘            └──────────────────┘              └──────────┘
//! ```
//!
//! ## Buffer Accounting
//!
//! The length byte is only *peeked* while the name is still incomplete.
//! Nothing is consumed from the buffer until the full header is present,
//! so the caller can compact and refill freely without losing position.
//! Once resolved, every remaining byte on the connection is payload.

use crate::protocol::types::{FileHeader, LENGTH_PREFIX_SIZE};
use bytes::Buf;

/// Where the decoder currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    /// No length byte seen yet
    #[default]
    AwaitingLength,

    /// Length known; waiting for `len` name bytes behind the prefix
    AwaitingName { len: u8 },

    /// Header consumed; the rest of the stream is payload
    Resolved,
}

/// Incremental decoder for the transfer header.
///
/// # Example
///
/// ```
/// use flashft::protocol::HeaderDecoder;
///
/// let mut decoder = HeaderDecoder::new();
///
/// let mut first: &[u8] = b"\x05a.";
/// assert!(decoder.decode(&mut first).is_none());
/// assert_eq!(first.len(), 3); // nothing consumed yet
///
/// let mut whole: &[u8] = b"\x05a.txthello";
/// let header = decoder.decode(&mut whole).unwrap();
/// assert_eq!(header.name(), b"a.txt");
/// assert_eq!(whole, b"hello");
/// ```
#[derive(Debug, Default)]
pub struct HeaderDecoder {
    state: DecodeState,
}

impl HeaderDecoder {
    /// Creates a decoder waiting for the length byte.
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitingLength,
        }
    }

    /// Current state of the decoder.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Whether the header has been fully received.
    pub fn is_resolved(&self) -> bool {
        self.state == DecodeState::Resolved
    }

    /// Attempts to advance using the unread bytes of `buf`.
    ///
    /// Returns the header exactly once, on the call that completes it, with
    /// the header bytes consumed from `buf` and any payload left in place.
    /// Returns `None` when more data is needed (nothing consumed) or when
    /// the header was already returned earlier.
    pub fn decode<B: Buf>(&mut self, buf: &mut B) -> Option<FileHeader> {
        loop {
            match self.state {
                DecodeState::AwaitingLength => {
                    if !buf.has_remaining() {
                        return None;
                    }
                    let len = buf.chunk()[0];
                    self.state = DecodeState::AwaitingName { len };
                }
                DecodeState::AwaitingName { len } => {
                    let needed = LENGTH_PREFIX_SIZE + len as usize;
                    if buf.remaining() < needed {
                        return None;
                    }
                    buf.advance(LENGTH_PREFIX_SIZE);
                    let name = buf.copy_to_bytes(len as usize);
                    self.state = DecodeState::Resolved;
                    return Some(FileHeader::from_wire(name));
                }
                DecodeState::Resolved => return None,
            }
        }
    }
}
