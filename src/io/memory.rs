use super::FileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

type Contents = Arc<Mutex<Vec<u8>>>;

#[derive(Debug)]
struct Node {
    data: Contents,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<PathBuf, Node>,
    dirs: BTreeSet<PathBuf>,
    /// Refuse to rename or remove files that have open handles
    locking: bool,
}

impl Tree {
    fn check_closed(&self, path: &Path) -> io::Result<()> {
        match self.files.get(path) {
            Some(node) if self.locking && Arc::strong_count(&node.data) > 1 => {
                Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("{}: file is open", path.display()),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// An in-memory filesystem.
///
/// Clones share the same tree. Handles keep the contents they were opened
/// with alive, so renaming over or removing an open file behaves like it
/// does on POSIX.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    tree: Arc<Mutex<Tree>>,
}

fn lock<T>(mutex: &Mutex<T>) -> io::Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| io::Error::other("memory filesystem lock poisoned"))
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path.display()),
    )
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filesystem that, like Windows, refuses to rename or remove a
    /// file while a handle to it is open.
    pub fn locking() -> Self {
        let tree = Tree {
            locking: true,
            ..Tree::default()
        };
        Self {
            tree: Arc::new(Mutex::new(tree)),
        }
    }

    /// Store `data` at `path`, replacing whatever was there.
    pub fn insert(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> io::Result<()> {
        let node = Node {
            data: Arc::new(Mutex::new(data.into())),
            modified: SystemTime::now(),
        };
        lock(&self.tree)?.files.insert(path.as_ref().to_path_buf(), node);
        Ok(())
    }

    /// Override the modification time reported for `path`.
    pub fn set_modified(&self, path: impl AsRef<Path>, modified: SystemTime) -> io::Result<()> {
        let path = path.as_ref();
        let mut tree = lock(&self.tree)?;
        let node = tree.files.get_mut(path).ok_or_else(|| not_found(path))?;
        node.modified = modified;
        Ok(())
    }

    /// Snapshot of the file stored at `path`.
    pub fn read(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        let path = path.as_ref();
        let tree = lock(&self.tree)?;
        let node = tree.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(lock(&node.data)?.clone())
    }

    /// Paths of every stored file, in sorted order.
    pub fn paths(&self) -> io::Result<Vec<PathBuf>> {
        Ok(lock(&self.tree)?.files.keys().cloned().collect())
    }
}

impl FileSystem for MemoryFs {
    type File = MemoryFile;

    fn open(&self, path: &Path) -> io::Result<MemoryFile> {
        let tree = lock(&self.tree)?;
        let node = tree.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(MemoryFile {
            data: Arc::clone(&node.data),
            pos: 0,
            writable: false,
        })
    }

    fn create_new(&self, path: &Path) -> io::Result<MemoryFile> {
        let mut tree = lock(&self.tree)?;
        if tree.files.contains_key(path) || tree.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{}: already exists", path.display()),
            ));
        }
        let data: Contents = Arc::default();
        let node = Node {
            data: Arc::clone(&data),
            modified: SystemTime::now(),
        };
        tree.files.insert(path.to_path_buf(), node);
        Ok(MemoryFile {
            data,
            pos: 0,
            writable: true,
        })
    }

    fn sync(&self, _file: &mut MemoryFile) -> io::Result<()> {
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = lock(&self.tree)?;
        tree.check_closed(from)?;
        tree.check_closed(to)?;
        let node = tree.files.remove(from).ok_or_else(|| not_found(from))?;
        tree.files.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut tree = lock(&self.tree)?;
        tree.check_closed(path)?;
        tree.files
            .remove(path)
            .map(drop)
            .ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut tree = lock(&self.tree)?;
        for dir in path.ancestors().filter(|p| !p.as_os_str().is_empty()) {
            tree.dirs.insert(dir.to_path_buf());
        }
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        let tree = lock(&self.tree)?;
        tree.files
            .get(path)
            .map(|node| node.modified)
            .ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        match lock(&self.tree) {
            Ok(tree) => tree.files.contains_key(path) || tree.dirs.contains(path),
            Err(_) => false,
        }
    }
}

/// Handle to a file in a [`MemoryFs`].
#[derive(Debug)]
pub struct MemoryFile {
    data: Contents,
    pos: u64,
    writable: bool,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = lock(&self.data)?;
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file was opened read-only",
            ));
        }
        let mut data = lock(&self.data)?;
        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "position out of range"))?;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = lock(&self.data)?.len() as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        self.pos = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
        })?;
        Ok(self.pos)
    }
}
