//! In-memory storage.
//!
//! Keeps every received file in a map shared between clones of the same
//! `MemoryStorage`. Unlike a filesystem it accepts any byte string as a
//! name, including the empty one. The map is reference counted without
//! locking, so it stays on the thread that created it.

use crate::storage::Storage;
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::rc::Rc;

type Files = Rc<RefCell<BTreeMap<Bytes, Vec<u8>>>>;

/// Stores received files in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Files,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of the file called `name`, if one was created.
    pub fn get(&self, name: &[u8]) -> Option<Vec<u8>> {
        self.files.borrow().get(name).cloned()
    }

    /// Whether a file called `name` was created.
    pub fn contains(&self, name: &[u8]) -> bool {
        self.files.borrow().contains_key(name)
    }

    /// Number of files stored.
    pub fn len(&self) -> usize {
        self.files.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.borrow().is_empty()
    }

    /// Names of all stored files, in byte order.
    pub fn names(&self) -> Vec<Bytes> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    type Sink = MemorySink;

    fn create(&mut self, name: &[u8]) -> io::Result<MemorySink> {
        let name = Bytes::copy_from_slice(name);
        self.files.borrow_mut().insert(name.clone(), Vec::new());
        Ok(MemorySink {
            files: Rc::clone(&self.files),
            name,
        })
    }
}

/// Append-only handle to one file inside a [`MemoryStorage`].
#[derive(Debug)]
pub struct MemorySink {
    files: Files,
    name: Bytes,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.borrow_mut();
        let file = files.entry(self.name.clone()).or_default();
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
