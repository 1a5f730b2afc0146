//! Fixed-Capacity Connection Buffer
//!
//! Every connection owns one of these for its whole lifetime. It is a
//! single linear region with two cursors and two modes:
//!
//! ```text
//!   0            read          write                 capacity
//!   ├─────────────┼─────────────┼──────────────────────┤
//!   │  consumed   │   unread    │     free (fill)      │
//!   └─────────────┴─────────────┴──────────────────────┘
//!                  ▲ drain side   ▲ fill side
//! ```
//!
//! - **Fill mode**: the socket writes into `[write..capacity)` and
//!   [`commit`](ConnectionBuffer::commit) advances `write`.
//! - **Drain mode**: the decoder and the file writer consume from
//!   `[read..write)` through the [`bytes::Buf`] implementation.
//!
//! [`flip`](ConnectionBuffer::flip) switches fill → drain and
//! [`compact`](ConnectionBuffer::compact) switches drain → fill, moving any
//! unread bytes to offset 0. Neither operation ever drops unread bytes.

use bytes::Buf;

/// Which side of the buffer is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Accepting bytes from the socket
    Fill,
    /// Exposing received bytes for consumption
    Drain,
}

/// A fixed-size byte region with independent fill and drain cursors.
#[derive(Debug)]
pub struct ConnectionBuffer {
    data: Box<[u8]>,
    read: usize,
    write: usize,
    mode: Mode,
}

impl ConnectionBuffer {
    /// Allocates a zeroed buffer of `capacity` bytes, in fill mode.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            mode: Mode::Fill,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Bytes received but not yet consumed.
    pub fn len(&self) -> usize {
        self.write - self.read
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Whether there is no room left to fill.
    pub fn is_full(&self) -> bool {
        self.write == self.data.len()
    }

    /// The free region the socket should read into.
    pub fn fill_region(&mut self) -> &mut [u8] {
        debug_assert_eq!(self.mode, Mode::Fill, "fill_region in drain mode");
        &mut self.data[self.write..]
    }

    /// Marks `n` bytes of the fill region as received.
    pub fn commit(&mut self, n: usize) {
        debug_assert_eq!(self.mode, Mode::Fill, "commit in drain mode");
        assert!(
            n <= self.data.len() - self.write,
            "commit past end of buffer: {} > {}",
            n,
            self.data.len() - self.write
        );
        self.write += n;
    }

    /// Switches to drain mode. Idempotent.
    pub fn flip(&mut self) {
        self.mode = Mode::Drain;
    }

    /// Switches back to fill mode, shifting unread bytes to the front.
    pub fn compact(&mut self) {
        if self.read > 0 {
            self.data.copy_within(self.read..self.write, 0);
            self.write -= self.read;
            self.read = 0;
        }
        self.mode = Mode::Fill;
    }

    /// The unread bytes.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }
}

impl Buf for ConnectionBuffer {
    fn remaining(&self) -> usize {
        self.len()
    }

    fn chunk(&self) -> &[u8] {
        debug_assert_eq!(self.mode, Mode::Drain, "chunk in fill mode");
        self.unread()
    }

    fn advance(&mut self, cnt: usize) {
        debug_assert_eq!(self.mode, Mode::Drain, "advance in fill mode");
        assert!(
            cnt <= self.len(),
            "cannot advance past end of unread data: {} > {}",
            cnt,
            self.len()
        );
        self.read += cnt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buffer: &mut ConnectionBuffer, bytes: &[u8]) {
        let region = buffer.fill_region();
        region[..bytes.len()].copy_from_slice(bytes);
        buffer.commit(bytes.len());
    }

    #[test]
    fn test_new_buffer_is_empty_fill_mode() {
        let buffer = ConnectionBuffer::with_capacity(16);
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(buffer.mode(), Mode::Fill);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_fill_then_drain() {
        let mut buffer = ConnectionBuffer::with_capacity(16);
        fill(&mut buffer, b"hello");

        buffer.flip();
        assert_eq!(buffer.mode(), Mode::Drain);
        assert_eq!(buffer.chunk(), b"hello");

        buffer.advance(2);
        assert_eq!(buffer.chunk(), b"llo");
        assert_eq!(buffer.remaining(), 3);
    }

    #[test]
    fn test_compact_moves_unread_to_front() {
        let mut buffer = ConnectionBuffer::with_capacity(8);
        fill(&mut buffer, b"abcdef");
        buffer.flip();
        buffer.advance(4);

        buffer.compact();
        assert_eq!(buffer.mode(), Mode::Fill);
        assert_eq!(buffer.unread(), b"ef");
        assert_eq!(buffer.fill_region().len(), 6);

        fill(&mut buffer, b"gh");
        buffer.flip();
        assert_eq!(buffer.chunk(), b"efgh");
    }

    #[test]
    fn test_flip_and_compact_never_drop_bytes() {
        let mut buffer = ConnectionBuffer::with_capacity(4);
        fill(&mut buffer, b"wxyz");
        assert!(buffer.is_full());

        buffer.flip();
        buffer.compact();
        buffer.flip();
        buffer.compact();

        assert_eq!(buffer.unread(), b"wxyz");
        assert!(buffer.is_full());
    }

    #[test]
    fn test_fully_drained_buffer_resets() {
        let mut buffer = ConnectionBuffer::with_capacity(4);
        fill(&mut buffer, b"wxyz");
        buffer.flip();
        buffer.advance(4);
        buffer.compact();

        assert!(buffer.is_empty());
        assert_eq!(buffer.fill_region().len(), 4);
    }

    #[test]
    fn test_buf_helpers_work_on_drain_side() {
        let mut buffer = ConnectionBuffer::with_capacity(16);
        fill(&mut buffer, b"\x03abcrest");
        buffer.flip();

        assert_eq!(buffer.get_u8(), 3);
        assert_eq!(&buffer.copy_to_bytes(3)[..], b"abc");
        assert_eq!(buffer.chunk(), b"rest");
    }

    #[test]
    #[should_panic(expected = "commit past end")]
    fn test_commit_past_capacity_panics() {
        let mut buffer = ConnectionBuffer::with_capacity(2);
        buffer.commit(3);
    }

    #[test]
    #[should_panic(expected = "cannot advance")]
    fn test_advance_past_unread_panics() {
        let mut buffer = ConnectionBuffer::with_capacity(4);
        fill(&mut buffer, b"ab");
        buffer.flip();
        buffer.advance(3);
    }
}
