//! Archive writer.
//!
//! Writes a complete archive in one pass: each member's local header and
//! data, then the central directory, then the end record. Offsets are
//! recomputed from the write position rather than trusted from the input
//! headers, and extra fields are dropped from both header copies.

use log::debug;
use std::io::{self, Read, Seek, SeekFrom, Write};

use super::error::{FormatError, IoContext, ZipError, ZipResult};
use super::structures::{CDFH_MIN_SIZE, EndOfCentralDirectory, FileHeader, LFH_SIZE};

/// A writer that tracks how many bytes have passed through it.
pub struct OffsetWriter<W> {
    inner: W,
    offset: u64,
}

impl<W: Write> OffsetWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, offset: 0 }
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for OffsetWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A member that is not yet in any archive: its header plus a reader
/// yielding exactly `header.compressed_size` bytes of stored data.
pub struct PendingEntry<'a> {
    pub header: FileHeader,
    pub data: &'a mut dyn Read,
}

/// What [`ArchiveWriter::finish`] laid down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArchive {
    /// Headers as written, with their new offsets
    pub headers: Vec<FileHeader>,
    pub central_dir_offset: u32,
    pub central_dir_size: u32,
}

/// Streams members into a new archive.
pub struct ArchiveWriter<W: Write> {
    writer: OffsetWriter<W>,
    headers: Vec<FileHeader>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: OffsetWriter::new(inner),
            headers: Vec::new(),
        }
    }

    fn position(&self) -> ZipResult<u32> {
        u32::try_from(self.writer.offset())
            .map_err(|_| ZipError::Unsupported("archive larger than 4 GiB".to_string()))
    }

    fn append(&mut self, mut header: FileHeader, data: &mut dyn Read) -> ZipResult<u64> {
        header.local_header_offset = self.position()?;
        header.extra_len_local = 0;
        header.write_local(&mut self.writer)?;

        let mut data = data.take(u64::from(header.compressed_size));
        let copied = io::copy(&mut data, &mut self.writer).during("write")?;
        self.headers.push(header);
        Ok(copied)
    }

    /// Copy a member of an existing archive, reading its data from
    /// `source` at the position its local header says it starts.
    pub fn copy_entry<S: Read + Seek>(&mut self, header: &FileHeader, source: &mut S) -> ZipResult<()> {
        source
            .seek(SeekFrom::Start(header.data_offset()))
            .during("write")?;
        let expected = u64::from(header.compressed_size);
        let copied = self.append(header.clone(), source.by_ref())?;
        if copied != expected {
            return Err(FormatError::UnexpectedEof.into());
        }
        Ok(())
    }

    /// Write a new member whose data comes from `data`.
    pub fn write_entry(&mut self, header: FileHeader, data: &mut dyn Read) -> ZipResult<()> {
        let expected = u64::from(header.compressed_size);
        let name = header.name_lossy().into_owned();
        let copied = self.append(header, data)?;
        if copied != expected {
            return Err(ZipError::Io {
                operation: "write",
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{name}: data ended after {copied} of {expected} bytes"),
                ),
            });
        }
        Ok(())
    }

    /// Write the central directory and end record, then flush.
    pub fn finish(mut self, comment: &[u8]) -> ZipResult<(W, WrittenArchive)> {
        let entries = u16::try_from(self.headers.len())
            .map_err(|_| ZipError::Unsupported("more than 65535 entries".to_string()))?;
        let comment_len = u16::try_from(comment.len()).map_err(|_| {
            ZipError::Unsupported("archive comment longer than 65535 bytes".to_string())
        })?;

        let central_dir_offset = self.position()?;
        for header in &mut self.headers {
            header.extra_len_central = 0;
            header.write_central(&mut self.writer)?;
        }
        let central_dir_size = self.position()? - central_dir_offset;

        EndOfCentralDirectory::new(entries, central_dir_size, central_dir_offset, comment_len)
            .write(&mut self.writer, comment)?;
        self.writer.flush().during("write")?;

        let written = WrittenArchive {
            headers: self.headers,
            central_dir_offset,
            central_dir_size,
        };
        Ok((self.writer.into_inner(), written))
    }
}

/// Write a new archive to `out` holding the members `headers` describes,
/// copied from `source`, followed by `new_entry` if given.
///
/// Format limits (entry count, comment length, 32-bit offsets) are
/// checked before anything is written.
pub fn rewrite<S, W>(
    source: &mut S,
    headers: &[FileHeader],
    new_entry: Option<PendingEntry<'_>>,
    comment: &[u8],
    out: W,
) -> ZipResult<(W, WrittenArchive)>
where
    S: Read + Seek,
    W: Write,
{
    let count = headers.len() + usize::from(new_entry.is_some());
    if count > usize::from(u16::MAX) {
        return Err(ZipError::Unsupported(format!(
            "{count} entries, at most 65535 fit in an archive"
        )));
    }
    if comment.len() > usize::from(u16::MAX) {
        return Err(ZipError::Unsupported(
            "archive comment longer than 65535 bytes".to_string(),
        ));
    }

    let members = || headers.iter().chain(new_entry.as_ref().map(|e| &e.header));
    let data_end: u64 = members()
        .map(|h| (LFH_SIZE + h.file_name.len()) as u64 + u64::from(h.compressed_size))
        .sum();
    let directory_size: u64 = members()
        .map(|h| (CDFH_MIN_SIZE + h.file_name.len() + h.comment.len()) as u64)
        .sum();
    if data_end > u64::from(u32::MAX) || directory_size > u64::from(u32::MAX) {
        return Err(ZipError::Unsupported(
            "archive larger than 4 GiB".to_string(),
        ));
    }

    let mut writer = ArchiveWriter::new(out);
    for header in headers {
        writer.copy_entry(header, source)?;
    }
    if let Some(PendingEntry { header, data }) = new_entry {
        writer.write_entry(header, data)?;
    }
    let (out, written) = writer.finish(comment)?;
    debug!(
        "wrote {count} entries, central directory at {} ({} bytes)",
        written.central_dir_offset, written.central_dir_size
    );
    Ok((out, written))
}
