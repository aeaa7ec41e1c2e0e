//! Write-to-temporary-then-rename.
//!
//! Anything replacing a file (the archive itself on add/remove, a
//! destination file on extract) is first written next to it under a
//! temporary name. The temporary file is removed again unless it is
//! committed by renaming it over the target. Temporary files are created
//! exclusively, so an existing file that happens to carry the temporary
//! name is never truncated: the next free name is used instead.

use log::{debug, warn};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{IoContext, ZipResult};
use crate::io::FileSystem;

/// `target` with `suffix` appended to its final component.
pub fn temp_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// How many numbered names are tried once `<target><suffix>` is taken.
const MAX_ATTEMPTS: u32 = 100;

/// A temporary file that is removed on drop unless committed.
pub(crate) struct StagedFile<F: FileSystem> {
    fs: F,
    path: PathBuf,
    committed: bool,
}

impl<F: FileSystem> StagedFile<F> {
    /// Create the temporary file for `target`.
    ///
    /// Tries `<target><suffix>`, then `<target><suffix>.1`, `.2` and so on,
    /// skipping names that already exist.
    pub fn create(
        fs: &F,
        target: &Path,
        suffix: &str,
        operation: &'static str,
    ) -> ZipResult<(Self, F::File)> {
        for attempt in 0..MAX_ATTEMPTS {
            let path = match attempt {
                0 => temp_path(target, suffix),
                n => temp_path(target, &format!("{suffix}.{n}")),
            };
            let file = match fs.create_new(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} already exists", path.display());
                    continue;
                }
                Err(e) => return Err(e).during(operation),
            };
            debug!("staging {}", path.display());
            let staged = Self {
                fs: fs.clone(),
                path,
                committed: false,
            };
            return Ok((staged, file));
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free temporary name for {}", target.display()),
        ))
        .during(operation)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temporary file over `target`.
    pub fn commit(mut self, target: &Path, operation: &'static str) -> ZipResult<()> {
        self.fs.rename(&self.path, target).during(operation)?;
        self.committed = true;
        Ok(())
    }
}

impl<F: FileSystem> Drop for StagedFile<F> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.fs.remove(&self.path) {
            warn!("failed to remove {}: {e}", self.path.display());
        }
    }
}
