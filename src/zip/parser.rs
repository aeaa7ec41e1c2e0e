//! Directory reader.
//!
//! ZIP files are read from the end:
//! 1. Find the End of Central Directory (EOCD) by scanning backwards
//! 2. Read the archive comment that follows it
//! 3. Read the whole Central Directory and parse each File Header
//! 4. Visit every Local File Header to check it and learn its extra length
//!
//! Every length read from the archive is checked against the stream size
//! before it is used, so damaged or truncated input yields a
//! [`FormatError`] rather than a panic or an oversized allocation.

use log::debug;
use std::io::{Read, Seek, SeekFrom};

use super::error::{ArchiveRead, FormatError, IoContext, ZipResult};
use super::structures::{EndOfCentralDirectory, FileHeader, LFH_SIZE, LocalFileHeader};

/// How many bytes the backward EOCD scan reads at a time.
const SCAN_CHUNK: usize = 8192;

/// Everything the central directory says about an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    /// File headers in central directory order
    pub headers: Vec<FileHeader>,
    /// Archive-level comment
    pub comment: Vec<u8>,
    pub central_dir_offset: u32,
    pub central_dir_size: u32,
}

/// Parses the directory structures of an archive stream.
pub struct ZipParser<'a, S> {
    stream: &'a mut S,
    /// Total size of the archive in bytes
    size: u64,
}

impl<'a, S: Read + Seek> ZipParser<'a, S> {
    pub fn new(stream: &'a mut S) -> ZipResult<Self> {
        let size = stream.seek(SeekFrom::End(0)).during("open")?;
        Ok(Self { stream, size })
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> ZipResult<()> {
        self.stream.seek(SeekFrom::Start(offset)).during("open")?;
        self.stream.read_exact(buf).reading("open")
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Every offset from `size - 22` down to 0 is a candidate, nearest to
    /// the end first, so a comment of any length is skipped over. The
    /// stream is read backwards in chunks that overlap by three bytes so a
    /// signature straddling two chunks is still seen.
    ///
    /// Returns the record and its offset in the stream.
    pub fn find_eocd(&mut self) -> ZipResult<(EndOfCentralDirectory, u64)> {
        let record = EndOfCentralDirectory::SIZE as u64;
        if self.size < record {
            return Err(FormatError::SignatureNotFound.into());
        }

        // signature bytes of the last candidate end here
        let mut end = self.size - record + 4;
        let mut buf = vec![0u8; SCAN_CHUNK];
        let offset = loop {
            let start = end.saturating_sub(SCAN_CHUNK as u64);
            let window = &mut buf[..(end - start) as usize];
            self.stream.seek(SeekFrom::Start(start)).during("open")?;
            self.stream.read_exact(window).reading("open")?;

            if let Some(i) = window
                .windows(4)
                .rposition(|w| w == EndOfCentralDirectory::SIGNATURE)
            {
                break start + i as u64;
            }
            if start == 0 {
                return Err(FormatError::SignatureNotFound.into());
            }
            end = start + 3;
        };

        let mut fixed = [0u8; EndOfCentralDirectory::SIZE];
        self.read_exact_at(offset, &mut fixed)?;
        let eocd = EndOfCentralDirectory::from_bytes(&fixed)?;
        debug!(
            "end of central directory at {offset}: {} entries, directory at {} ({} bytes)",
            eocd.total_entries, eocd.cd_offset, eocd.cd_size
        );
        Ok((eocd, offset))
    }

    fn read_comment(&mut self, eocd_offset: u64, len: u16) -> ZipResult<Vec<u8>> {
        let start = eocd_offset + EndOfCentralDirectory::SIZE as u64;
        if start + u64::from(len) > self.size {
            return Err(FormatError::TruncatedComment.into());
        }
        let mut comment = vec![0u8; usize::from(len)];
        self.read_exact_at(start, &mut comment)?;
        Ok(comment)
    }

    /// Read the Central Directory and parse `total_entries` headers from it.
    fn read_central_directory(
        &mut self,
        eocd: &EndOfCentralDirectory,
        eocd_offset: u64,
    ) -> ZipResult<Vec<FileHeader>> {
        let cd_offset = u64::from(eocd.cd_offset);
        let cd_size = u64::from(eocd.cd_size);
        if cd_offset + cd_size > eocd_offset {
            return Err(FormatError::CentralDirectoryOutOfBounds.into());
        }

        // Read the entire Central Directory in one go
        let mut cd_data = vec![0u8; cd_size as usize];
        self.read_exact_at(cd_offset, &mut cd_data)?;

        let mut headers = Vec::with_capacity(usize::from(eocd.total_entries));
        let mut pos = 0;
        for _ in 0..eocd.total_entries {
            let (header, used) = FileHeader::parse_central(&cd_data[pos..])?;
            headers.push(header);
            pos += used;
        }
        Ok(headers)
    }

    /// Read and check the fixed part of the local header at `offset`.
    pub fn read_local_header(&mut self, offset: u32) -> ZipResult<LocalFileHeader> {
        let offset = u64::from(offset);
        if offset + LFH_SIZE as u64 > self.size {
            return Err(FormatError::TruncatedLocalHeader.into());
        }
        let mut fixed = [0u8; LFH_SIZE];
        self.read_exact_at(offset, &mut fixed)?;
        LocalFileHeader::from_bytes(&fixed)
    }

    /// Cross-check every header against its local copy and record the
    /// local extra field length, which decides where the data starts.
    fn check_local_headers(&mut self, headers: &mut [FileHeader]) -> ZipResult<()> {
        for header in headers.iter_mut() {
            let local = self.read_local_header(header.local_header_offset)?;
            if usize::from(local.name_len) != header.file_name.len() {
                return Err(FormatError::HeaderMismatch.into());
            }
            header.extra_len_local = local.extra_len;
        }
        Ok(())
    }

    /// Parse the whole directory.
    pub fn read_directory(mut self) -> ZipResult<Directory> {
        let (eocd, eocd_offset) = self.find_eocd()?;
        let comment = self.read_comment(eocd_offset, eocd.comment_len)?;
        let mut headers = self.read_central_directory(&eocd, eocd_offset)?;
        self.check_local_headers(&mut headers)?;
        debug!("read {} central directory entries", headers.len());

        Ok(Directory {
            headers,
            comment,
            central_dir_offset: eocd.cd_offset,
            central_dir_size: eocd.cd_size,
        })
    }
}

/// Parse the directory of the archive in `stream`.
pub fn read_directory<S: Read + Seek>(stream: &mut S) -> ZipResult<Directory> {
    ZipParser::new(stream)?.read_directory()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::zip::date::DosDateTime;
    use crate::zip::error::ZipError;
    use crate::zip::structures::CompressionMethod;
    use std::io::Cursor;

    /// Three stored entries `file1.txt`..`file3.txt` with five-byte bodies,
    /// per-file comments and the archive comment "ArchiveComment".
    pub(crate) const THREE_ENTRIES: &[u8] = b"\x50\x4b\x03\x04\x14\x00\x00\x00\x00\x00\x84\x4a\x7e\x59\x1c\x95\x68\xa6\x05\x00\x00\x00\x05\x00\x00\x00\x09\x00\x00\x00\x66\x69\x6c\x65\x31\x2e\x74\x78\x74\x62\x6f\x64\x79\x31\x50\x4b\x03\x04\x14\x00\x00\x00\x00\x00\x88\x4a\x7e\x59\xa6\xc4\x61\x3f\x05\x00\x00\x00\x05\x00\x00\x00\x09\x00\x00\x00\x66\x69\x6c\x65\x32\x2e\x74\x78\x74\x62\x6f\x64\x79\x32\x50\x4b\x03\x04\x14\x00\x00\x00\x00\x00\x8c\x4a\x7e\x59\x30\xf4\x66\x48\x05\x00\x00\x00\x05\x00\x00\x00\x09\x00\x00\x00\x66\x69\x6c\x65\x33\x2e\x74\x78\x74\x62\x6f\x64\x79\x33\x50\x4b\x01\x02\x14\x00\x14\x00\x00\x00\x00\x00\x84\x4a\x7e\x59\x1c\x95\x68\xa6\x05\x00\x00\x00\x05\x00\x00\x00\x09\x00\x00\x00\x0e\x00\x00\x00\x01\x00\x20\x00\x00\x00\x00\x00\x00\x00\x66\x69\x6c\x65\x31\x2e\x74\x78\x74\x43\x6f\x6d\x6d\x65\x6e\x74\x4f\x6e\x46\x69\x6c\x65\x31\x50\x4b\x01\x02\x14\x00\x14\x00\x00\x00\x00\x00\x88\x4a\x7e\x59\xa6\xc4\x61\x3f\x05\x00\x00\x00\x05\x00\x00\x00\x09\x00\x00\x00\x0e\x00\x00\x00\x01\x00\x20\x00\x00\x00\x2c\x00\x00\x00\x66\x69\x6c\x65\x32\x2e\x74\x78\x74\x43\x6f\x6d\x6d\x65\x6e\x74\x4f\x6e\x46\x69\x6c\x65\x32\x50\x4b\x01\x02\x14\x00\x14\x00\x00\x00\x00\x00\x8c\x4a\x7e\x59\x30\xf4\x66\x48\x05\x00\x00\x00\x05\x00\x00\x00\x09\x00\x00\x00\x0e\x00\x00\x00\x01\x00\x20\x00\x00\x00\x58\x00\x00\x00\x66\x69\x6c\x65\x33\x2e\x74\x78\x74\x43\x6f\x6d\x6d\x65\x6e\x74\x4f\x6e\x46\x69\x6c\x65\x33\x50\x4b\x05\x06\x00\x00\x00\x00\x03\x00\x03\x00\xcf\x00\x00\x00\x84\x00\x00\x00\x0e\x00\x41\x72\x63\x68\x69\x76\x65\x43\x6f\x6d\x6d\x65\x6e\x74";

    /// One stored entry `test.txt` containing "TestBody".
    pub(crate) const ONE_ENTRY: &[u8] = b"\x50\x4b\x03\x04\x14\x00\x00\x00\x00\x00\x22\x4b\x7c\x59\xe7\x03\xfa\xb6\x08\x00\x00\x00\x08\x00\x00\x00\x08\x00\x00\x00\x74\x65\x73\x74\x2e\x74\x78\x74\x54\x65\x73\x74\x42\x6f\x64\x79\x50\x4b\x01\x02\x14\x00\x14\x00\x00\x00\x00\x00\x22\x4b\x7c\x59\xe7\x03\xfa\xb6\x08\x00\x00\x00\x08\x00\x00\x00\x08\x00\x00\x00\x00\x00\x00\x00\x01\x00\x20\x00\x00\x00\x00\x00\x00\x00\x74\x65\x73\x74\x2e\x74\x78\x74\x50\x4b\x05\x06\x00\x00\x00\x00\x01\x00\x01\x00\x36\x00\x00\x00\x2e\x00\x00\x00\x00\x00";

    fn parse(bytes: &[u8]) -> ZipResult<Directory> {
        read_directory(&mut Cursor::new(bytes))
    }

    fn patched(offset: usize, bytes: &[u8]) -> Vec<u8> {
        let mut data = ONE_ENTRY.to_vec();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        data
    }

    fn expected_header(n: u8, time: u16, crc32: u32, offset: u32) -> FileHeader {
        FileHeader {
            version_made_by: 0x14,
            version_needed: 0x14,
            flags: 0,
            compression_method: CompressionMethod::Stored,
            modified: DosDateTime::new(0x597e, time),
            crc32,
            compressed_size: 5,
            uncompressed_size: 5,
            extra_len_local: 0,
            extra_len_central: 0,
            internal_attr: 1,
            external_attr: 0x20,
            local_header_offset: offset,
            file_name: format!("file{n}.txt").into_bytes(),
            comment: format!("CommentOnFile{n}").into_bytes(),
        }
    }

    #[test]
    fn reads_three_entry_directory() {
        let dir = parse(THREE_ENTRIES).unwrap();

        assert_eq!(dir.comment, b"ArchiveComment");
        assert_eq!(dir.central_dir_offset, 132);
        assert_eq!(dir.central_dir_size, 207);
        assert_eq!(
            dir.headers,
            vec![
                expected_header(1, 0x4a84, 0xa668951c, 0x00),
                expected_header(2, 0x4a88, 0x3f61c4a6, 0x2c),
                expected_header(3, 0x4a8c, 0x4866f430, 0x58),
            ]
        );
    }

    #[test]
    fn well_formed_archives_parse() {
        parse(ONE_ENTRY).unwrap();

        let mut with_comment = ONE_ENTRY.to_vec();
        let len = with_comment.len();
        with_comment[len - 2] = 7;
        with_comment.extend_from_slice(b"Comment");
        assert_eq!(parse(&with_comment).unwrap().comment, b"Comment");
    }

    #[test]
    fn rejects_malformed_archives() {
        let eocd = ONE_ENTRY.len() - EndOfCentralDirectory::SIZE;

        let mut long_comment = ONE_ENTRY.to_vec();
        let len = long_comment.len();
        long_comment[len - 2] = 8;
        long_comment.extend_from_slice(b"Comment");

        let cases: Vec<(&str, Vec<u8>, FormatError)> = vec![
            ("comment too long", long_comment, FormatError::TruncatedComment),
            (
                "no eocd signature",
                patched(eocd + 2, b"\x00\x00"),
                FormatError::SignatureNotFound,
            ),
            (
                "too short for eocd",
                ONE_ENTRY[eocd..eocd + 21].to_vec(),
                FormatError::SignatureNotFound,
            ),
            (
                "directory offset too big",
                patched(eocd + 16, b"\x7a"),
                FormatError::CentralDirectoryOutOfBounds,
            ),
            (
                "no central directory signature",
                patched(0x2e + 2, b"\x00\x00"),
                FormatError::BadCentralDirectorySignature,
            ),
            (
                "file name too long",
                patched(0x2e + 28, b"\xff"),
                FormatError::MalformedCentralDirectory,
            ),
            (
                "extra field too long",
                patched(0x2e + 30, b"\xff"),
                FormatError::MalformedCentralDirectory,
            ),
            (
                "file comment too long",
                patched(0x2e + 32, b"\xff"),
                FormatError::MalformedCentralDirectory,
            ),
            (
                "bad local signature",
                patched(3, b"\x00"),
                FormatError::BadLocalHeaderSignature,
            ),
            (
                "local name length differs",
                patched(26, b"\x07"),
                FormatError::HeaderMismatch,
            ),
            (
                "local header past end",
                patched(0x2e + 42, b"\x60\x00\x00\x00"),
                FormatError::TruncatedLocalHeader,
            ),
        ];

        for (name, data, expected) in cases {
            let err = parse(&data).unwrap_err();
            assert_eq!(err.format(), Some(expected), "{name}: {err}");
        }
    }

    #[test]
    fn local_extra_length_is_recorded() {
        // local header claims a one-byte extra field the central copy lacks
        let dir = parse(&patched(28, b"\x01")).unwrap();
        let header = &dir.headers[0];
        assert_eq!(header.extra_len_local, 1);
        assert_eq!(header.extra_len_central, 0);
        assert_eq!(header.data_offset(), 30 + 8 + 1);
    }

    #[test]
    fn empty_archive_is_just_an_eocd() {
        let data = b"PK\x05\x06\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
        let dir = parse(data).unwrap();
        assert!(dir.headers.is_empty());
        assert!(dir.comment.is_empty());
    }

    #[test]
    fn empty_stream_has_no_signature() {
        let err = parse(&[]).unwrap_err();
        assert_eq!(err.format(), Some(FormatError::SignatureNotFound));
    }

    #[test]
    fn every_truncation_is_a_format_error() {
        for len in 0..THREE_ENTRIES.len() {
            match parse(&THREE_ENTRIES[..len]) {
                Ok(_) => {}
                Err(ZipError::Format(_)) => {}
                Err(other) => panic!("prefix of {len} bytes: {other:?}"),
            }
        }
    }

    #[test]
    fn signature_straddling_scan_chunks_is_found() {
        // pad the comment so the first chunk starts on or inside the signature
        for shift in 0..4usize {
            let comment_len = SCAN_CHUNK - 4 + shift;
            let mut data = ONE_ENTRY.to_vec();
            let len = data.len();
            data[len - 2..].copy_from_slice(&(comment_len as u16).to_le_bytes());
            data.resize(len + comment_len, b'c');
            assert_eq!(parse(&data).unwrap().comment.len(), comment_len);
        }
    }
}
