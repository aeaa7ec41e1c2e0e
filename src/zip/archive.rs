//! An open archive and the operations that change it.
//!
//! Every mutation rewrites the whole archive. The new contents are written
//! to a temporary file next to the archive, parsed back to check them, and
//! renamed over the original. Only then is the new directory adopted in
//! memory, so a failed mutation leaves both the file on disk and the
//! [`Archive`] exactly as they were.

use log::{debug, info};
use std::fmt;
use std::io::{BufWriter, IntoInnerError, Seek};
use std::path::{Component, Path, PathBuf};

use super::crc;
use super::date::DosDateTime;
use super::error::{FormatError, IoContext, ZipError, ZipResult};
use super::extractor;
use super::parser::read_directory;
use super::staged::StagedFile;
use super::structures::{CompressionMethod, FileHeader};
use super::writer::{self, ArchiveWriter, PendingEntry, WrittenArchive};
use crate::io::{FileSystem, LocalFs};

/// Header fields given to newly added members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDefaults {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
}

impl Default for HeaderDefaults {
    fn default() -> Self {
        Self {
            version_made_by: 20,
            version_needed: 20,
            flags: 0,
            internal_attr: 0,
            external_attr: 0,
        }
    }
}

/// Settings an [`Archive`] is opened or created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub header_defaults: HeaderDefaults,
    /// Appended to a file's path to name its temporary replacement
    pub temp_suffix: String,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            header_defaults: HeaderDefaults::default(),
            temp_suffix: ".tmp".to_string(),
        }
    }
}

/// The name a file is stored under when added by path: its normal
/// components joined with '/'. Roots and `..` are dropped, so the name
/// always extracts below the extraction root.
pub fn entry_name(path: &Path) -> Vec<u8> {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/").into_bytes()
}

/// An open ZIP archive.
pub struct Archive<F: FileSystem = LocalFs> {
    fs: F,
    path: PathBuf,
    /// Closed while the archive is being replaced; reopened on next use
    stream: Option<F::File>,
    options: ArchiveOptions,
    headers: Vec<FileHeader>,
    comment: Vec<u8>,
    central_dir_offset: u32,
    central_dir_size: u32,
}

impl Archive<LocalFs> {
    /// Open an existing archive on the local filesystem.
    pub fn open(path: impl AsRef<Path>) -> ZipResult<Self> {
        Self::open_with(LocalFs, path, ArchiveOptions::default())
    }

    /// Create an empty archive on the local filesystem, replacing any file
    /// already at `path`.
    pub fn create(path: impl AsRef<Path>) -> ZipResult<Self> {
        Self::create_with(LocalFs, path, ArchiveOptions::default())
    }
}

impl<F: FileSystem> Archive<F> {
    pub fn open_with(fs: F, path: impl AsRef<Path>, options: ArchiveOptions) -> ZipResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut stream = fs.open(&path).during("open")?;
        let dir = read_directory(&mut stream)?;
        debug!("opened {} ({} entries)", path.display(), dir.headers.len());

        Ok(Self {
            fs,
            path,
            stream: Some(stream),
            options,
            headers: dir.headers,
            comment: dir.comment,
            central_dir_offset: dir.central_dir_offset,
            central_dir_size: dir.central_dir_size,
        })
    }

    pub fn create_with(fs: F, path: impl AsRef<Path>, options: ArchiveOptions) -> ZipResult<Self> {
        let path = path.as_ref();
        let (staged, file) = StagedFile::create(&fs, path, &options.temp_suffix, "create")?;
        let (out, _) = ArchiveWriter::new(BufWriter::new(file)).finish(&[])?;
        let mut file = out
            .into_inner()
            .map_err(IntoInnerError::into_error)
            .during("create")?;
        fs.sync(&mut file).during("create")?;
        drop(file);
        staged.commit(path, "create")?;
        info!("created {}", path.display());

        Self::open_with(fs, path, options)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Member headers in central directory order.
    pub fn entries(&self) -> &[FileHeader] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// The archive-level comment.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn central_dir_offset(&self) -> u32 {
        self.central_dir_offset
    }

    pub fn central_dir_size(&self) -> u32 {
        self.central_dir_size
    }

    /// Look a member up by its exact stored name.
    pub fn find(&self, name: impl AsRef<[u8]>) -> Option<&FileHeader> {
        let name = name.as_ref();
        self.headers.iter().find(|h| h.file_name == name)
    }

    fn lookup(&self, name: &[u8]) -> ZipResult<FileHeader> {
        self.find(name)
            .cloned()
            .ok_or_else(|| ZipError::NotFound(String::from_utf8_lossy(name).into_owned()))
    }

    /// Read a member's data into memory, checking its CRC.
    pub fn read_file(&mut self, name: impl AsRef<[u8]>) -> ZipResult<Vec<u8>> {
        let header = self.lookup(name.as_ref())?;
        let stream = reopen(&self.fs, &self.path, &mut self.stream)?;
        extractor::read_entry(stream, &header)
    }

    /// Extract one member under `root`, returning the path written.
    pub fn extract_file(
        &mut self,
        name: impl AsRef<[u8]>,
        root: impl AsRef<Path>,
    ) -> ZipResult<PathBuf> {
        let header = self.lookup(name.as_ref())?;
        let stream = reopen(&self.fs, &self.path, &mut self.stream)?;
        extractor::extract_entry(
            &self.fs,
            stream,
            &header,
            root.as_ref(),
            &self.options.temp_suffix,
        )
    }

    /// Extract every member under `root`, in directory order.
    ///
    /// Stops at the first member that fails; members extracted before it
    /// stay in place.
    pub fn extract_all(&mut self, root: impl AsRef<Path>) -> ZipResult<Vec<PathBuf>> {
        let root = root.as_ref();
        let stream = reopen(&self.fs, &self.path, &mut self.stream)?;
        let mut written = Vec::with_capacity(self.headers.len());
        for header in &self.headers {
            let dest = extractor::extract_entry(
                &self.fs,
                &mut *stream,
                header,
                root,
                &self.options.temp_suffix,
            )?;
            written.push(dest);
        }
        Ok(written)
    }

    /// Add the file at `source`, stored under a name derived from its path.
    /// A member with the same name is replaced and moves to the end.
    pub fn add_file(
        &mut self,
        source: impl AsRef<Path>,
        method: CompressionMethod,
    ) -> ZipResult<()> {
        let source = source.as_ref();
        self.add_file_as(source, entry_name(source), method)
    }

    /// Add the file at `source` under `name`.
    pub fn add_file_as(
        &mut self,
        source: impl AsRef<Path>,
        name: impl Into<Vec<u8>>,
        method: CompressionMethod,
    ) -> ZipResult<()> {
        if method != CompressionMethod::Stored {
            return Err(ZipError::Unsupported(format!(
                "compression method {method} (only stored entries can be added)"
            )));
        }
        let name = name.into();
        if name.is_empty() {
            return Err(ZipError::Unsupported("empty entry name".to_string()));
        }

        let source = source.as_ref();
        let mut data = self.fs.open(source).during("add")?;
        let modified = self.fs.modified(source).during("add")?;
        let (crc32, size) = crc::checksum(&mut data).during("add")?;
        let size = u32::try_from(size).map_err(|_| {
            ZipError::Unsupported(format!("{}: larger than 4 GiB", source.display()))
        })?;
        data.rewind().during("add")?;

        let defaults = self.options.header_defaults;
        let header = FileHeader {
            version_made_by: defaults.version_made_by,
            version_needed: defaults.version_needed,
            flags: defaults.flags,
            compression_method: method,
            modified: DosDateTime::from(modified),
            crc32,
            compressed_size: size,
            uncompressed_size: size,
            extra_len_local: 0,
            extra_len_central: 0,
            internal_attr: defaults.internal_attr,
            external_attr: defaults.external_attr,
            local_header_offset: 0,
            file_name: name,
            comment: Vec::new(),
        };
        let kept: Vec<FileHeader> = self
            .headers
            .iter()
            .filter(|h| h.file_name != header.file_name)
            .cloned()
            .collect();

        let label = header.name_lossy().into_owned();
        let pending = PendingEntry {
            header,
            data: &mut data,
        };
        self.commit(&kept, Some(pending), "add")?;
        info!("added {label} to {}", self.path.display());
        Ok(())
    }

    /// Remove the member called `name`.
    ///
    /// Returns `false`, without touching the archive, if there is none.
    pub fn remove_file(&mut self, name: impl AsRef<[u8]>) -> ZipResult<bool> {
        let name = name.as_ref();
        if self.find(name).is_none() {
            debug!("{} is not in the archive", String::from_utf8_lossy(name));
            return Ok(false);
        }

        let kept: Vec<FileHeader> = self
            .headers
            .iter()
            .filter(|h| h.file_name != name)
            .cloned()
            .collect();
        self.commit(&kept, None, "remove")?;
        info!(
            "removed {} from {}",
            String::from_utf8_lossy(name),
            self.path.display()
        );
        Ok(true)
    }

    /// Write `headers` (plus `new_entry`) to a staged copy, check it,
    /// rename it over the archive and adopt the result.
    ///
    /// The archive handle is closed before the rename and reopened after
    /// it, whether or not the rename succeeded.
    fn commit(
        &mut self,
        headers: &[FileHeader],
        new_entry: Option<PendingEntry<'_>>,
        operation: &'static str,
    ) -> ZipResult<()> {
        let source = reopen(&self.fs, &self.path, &mut self.stream)?;
        let (staged, file) =
            StagedFile::create(&self.fs, &self.path, &self.options.temp_suffix, operation)?;
        let (out, written) = writer::rewrite(
            source,
            headers,
            new_entry,
            &self.comment,
            BufWriter::new(file),
        )?;
        let mut file = out
            .into_inner()
            .map_err(IntoInnerError::into_error)
            .during(operation)?;
        self.fs.sync(&mut file).during(operation)?;
        drop(file);

        self.verify(staged.path(), &written, operation)?;

        self.stream = None;
        if let Err(e) = staged.commit(&self.path, operation) {
            self.stream = self.fs.open(&self.path).ok();
            return Err(e);
        }

        self.headers = written.headers;
        self.central_dir_offset = written.central_dir_offset;
        self.central_dir_size = written.central_dir_size;
        self.stream = Some(self.fs.open(&self.path).during(operation)?);
        Ok(())
    }

    /// Parse the staged archive back and compare it with what was written.
    fn verify(
        &self,
        staged: &Path,
        written: &WrittenArchive,
        operation: &'static str,
    ) -> ZipResult<()> {
        let mut file = self.fs.open(staged).during(operation)?;
        let dir = read_directory(&mut file).map_err(|e| match e {
            ZipError::Format(_) => ZipError::Format(FormatError::VerificationFailed),
            other => other,
        })?;

        if dir.headers != written.headers
            || dir.comment != self.comment
            || dir.central_dir_offset != written.central_dir_offset
            || dir.central_dir_size != written.central_dir_size
        {
            return Err(FormatError::VerificationFailed.into());
        }
        Ok(())
    }
}

/// The open archive handle in `slot`, opening `path` again if it was closed.
fn reopen<'a, F: FileSystem>(
    fs: &F,
    path: &Path,
    slot: &'a mut Option<F::File>,
) -> ZipResult<&'a mut F::File> {
    let stream = match slot.take() {
        Some(stream) => stream,
        None => fs.open(path).during("open")?,
    };
    Ok(slot.insert(stream))
}

impl<F: FileSystem> fmt::Debug for Archive<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("entries", &self.headers.len())
            .field("central_dir_offset", &self.central_dir_offset)
            .field("central_dir_size", &self.central_dir_size)
            .finish_non_exhaustive()
    }
}
