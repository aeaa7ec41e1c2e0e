//! # storezip
//!
//! A small ZIP archive library and tool for stored (uncompressed) members.
//!
//! It reads an archive's central directory, cross-checks it against the
//! local file headers, lists and extracts members with CRC-32
//! verification, and adds or removes members by rewriting the whole
//! archive through a temporary file that atomically replaces the original.
//!
//! ## Features
//!
//! - Backward scan for the end of central directory record, so archives
//!   with comments of any length open
//! - Bounds-checked parsing: damaged or truncated archives are reported as
//!   [`FormatError`]s, never panics
//! - Crash-safe add and remove: write to a temporary file, parse it back,
//!   then rename it over the archive
//! - A [`FileSystem`](io::FileSystem) seam with a local and an in-memory
//!   implementation
//!
//! ## Example
//!
//! ```no_run
//! use storezip::{Archive, CompressionMethod};
//!
//! fn main() -> storezip::ZipResult<()> {
//!     let mut archive = Archive::open("bundle.zip")?;
//!     for entry in archive.entries() {
//!         println!("{} ({} bytes)", entry.name_lossy(), entry.uncompressed_size);
//!     }
//!
//!     archive.add_file("notes.txt", CompressionMethod::Stored)?;
//!     archive.remove_file("stale.txt")?;
//!     archive.extract_all("out")?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod zip;

pub use cli::{Cli, Mode};
pub use io::{FileSystem, LocalFs, MemoryFs};
pub use zip::{
    Archive, ArchiveOptions, CompressionMethod, DosDateTime, FileHeader, FormatError,
    HeaderDefaults, ZipError, ZipResult,
};
