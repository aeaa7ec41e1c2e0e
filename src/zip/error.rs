//! Error types for archive operations.

use std::io;
use thiserror::Error;

/// Result alias used throughout the archive code.
pub type ZipResult<T> = Result<T, ZipError>;

/// Ways in which archive bytes can violate the expected structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("end of central directory signature not found")]
    SignatureNotFound,
    #[error("archive comment runs past the end of the file")]
    TruncatedComment,
    #[error("central directory lies outside the archive")]
    CentralDirectoryOutOfBounds,
    #[error("malformed central directory")]
    MalformedCentralDirectory,
    #[error("bad central directory signature")]
    BadCentralDirectorySignature,
    #[error("bad local file header signature")]
    BadLocalHeaderSignature,
    #[error("local file header lies outside the archive")]
    TruncatedLocalHeader,
    #[error("local header does not match its central directory entry")]
    HeaderMismatch,
    #[error("unsafe entry name")]
    UnsafeEntryName,
    #[error("rewritten archive failed verification")]
    VerificationFailed,
    #[error("unexpected end of archive data")]
    UnexpectedEof,
}

/// Every failure an archive operation can report.
#[derive(Debug, Error)]
pub enum ZipError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}: not found in archive")]
    NotFound(String),

    #[error("{name}: crc mismatch (header {expected:08x}, data {actual:08x})")]
    Integrity {
        name: String,
        expected: u32,
        actual: u32,
    },

    #[error("{operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ZipError {
    /// The [`FormatError`] behind this error, if it is one.
    pub fn format(&self) -> Option<FormatError> {
        match self {
            ZipError::Format(err) => Some(*err),
            _ => None,
        }
    }
}

/// Attach the name of the failing operation to an I/O result.
pub(crate) trait IoContext<T> {
    fn during(self, operation: &'static str) -> ZipResult<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn during(self, operation: &'static str) -> ZipResult<T> {
        self.map_err(|source| ZipError::Io { operation, source })
    }
}

/// Like [`IoContext::during`], but reports running out of archive bytes as a
/// format error. Used wherever a short read means the archive is truncated.
pub(crate) trait ArchiveRead<T> {
    fn reading(self, operation: &'static str) -> ZipResult<T>;
}

impl<T> ArchiveRead<T> for io::Result<T> {
    fn reading(self, operation: &'static str) -> ZipResult<T> {
        self.map_err(|source| match source.kind() {
            io::ErrorKind::UnexpectedEof => FormatError::UnexpectedEof.into(),
            _ => ZipError::Io { operation, source },
        })
    }
}
