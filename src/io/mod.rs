mod local;
mod memory;

pub use local::LocalFs;
pub use memory::{MemoryFile, MemoryFs};

use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

/// Filesystem primitives the archive code is written against.
///
/// Handles returned by [`open`](FileSystem::open) and
/// [`create_new`](FileSystem::create_new) are closed by dropping them.
pub trait FileSystem: Clone + Send + Sync {
    /// Handle type for files opened through this filesystem.
    type File: Read + Write + Seek + Send;

    /// Open an existing file for reading.
    fn open(&self, path: &Path) -> io::Result<Self::File>;

    /// Create a file for writing, failing with
    /// [`AlreadyExists`](io::ErrorKind::AlreadyExists) if `path` exists.
    fn create_new(&self, path: &Path) -> io::Result<Self::File>;

    /// Flush a written file's contents to durable storage.
    fn sync(&self, file: &mut Self::File) -> io::Result<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    ///
    /// Some platforms refuse to replace a file that is still open, so
    /// callers close their handles to `to` first.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Recursively create a directory and its parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Last modification time of a file.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Check whether a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}
