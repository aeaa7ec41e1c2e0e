//! ZIP archive reading, extraction and rewriting.
//!
//! ## Architecture
//!
//! - [`structures`]: byte layouts of the three record types (local file
//!   header, central directory file header, end of central directory)
//! - [`parser`]: locates the end record and reads the central directory,
//!   checking every record against the bytes actually present
//! - [`writer`]: lays down a complete archive, recomputing every offset
//! - [`extractor`]: copies stored members out with a CRC-32 check
//! - [`Archive`]: an open archive whose add and remove operations rewrite
//!   it through a temporary file that replaces the original only once it
//!   parses back correctly
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and data for each member
//! 2. Central Directory with metadata for all members
//! 3. End of Central Directory (EOCD) record at the end, optionally
//!    followed by an archive comment
//!
//! ## Limitations
//!
//! - Only the STORED method; DEFLATE is recognised but not decoded
//! - No ZIP64, so at most 65535 members and 4 GiB
//! - No encryption, data descriptors or multi-disk archives
//! - Extra fields are dropped whenever an archive is rewritten

mod archive;
mod crc;
mod date;
mod error;
pub mod extractor;
pub mod parser;
mod staged;
pub mod structures;
pub mod writer;

pub use archive::{Archive, ArchiveOptions, HeaderDefaults, entry_name};
pub use crc::{CrcWriter, checksum};
pub use date::DosDateTime;
pub use error::{FormatError, ZipError, ZipResult};
pub use parser::{Directory, ZipParser, read_directory};
pub use staged::temp_path;
pub use structures::{CompressionMethod, EndOfCentralDirectory, FileHeader, LocalFileHeader};
pub use writer::{ArchiveWriter, OffsetWriter, PendingEntry, WrittenArchive, rewrite};
