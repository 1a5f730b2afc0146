//! Directory-backed storage.
//!
//! Received files are written below a root directory. The filename from
//! the header is joined onto the root as-is, so an absolute name escapes
//! the root and an empty name resolves to the root directory itself (which
//! the OS refuses to open as a file).

use crate::protocol::types::name_to_path;
use crate::storage::Storage;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Writes received files into a directory.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Creates a storage rooted at `root`. The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory received files are written into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path a file called `name` would be written to.
    pub fn path_for(&self, name: &[u8]) -> PathBuf {
        self.root.join(name_to_path(name))
    }
}

impl Default for DirStorage {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Storage for DirStorage {
    type Sink = File;

    fn create(&mut self, name: &[u8]) -> io::Result<File> {
        let path = self.path_for(name);
        trace!(path = %path.display(), "Opening output file");
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }
}
