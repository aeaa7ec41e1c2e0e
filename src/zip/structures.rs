use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::fmt;
use std::io::{Cursor, Write};

use super::date::DosDateTime;
use super::error::{ArchiveRead, FormatError, IoContext, ZipError, ZipResult};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => f.write_str("stored"),
            CompressionMethod::Deflate => f.write_str("deflated"),
            CompressionMethod::Unknown(v) => write!(f, "{v}"),
        }
    }
}

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

fn checked_u16(len: usize, what: &str) -> ZipResult<u16> {
    u16::try_from(len).map_err(|_| ZipError::Unsupported(format!("{what} longer than 65535 bytes")))
}

/// Metadata for one archive member, as kept in the central directory.
///
/// Extra fields are never kept, only their lengths: the local header and
/// central directory may carry extra fields of different sizes, and the
/// local one decides where the member's data starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub extra_len_local: u16,
    pub extra_len_central: u16,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub local_header_offset: u32,
    pub file_name: Vec<u8>,
    pub comment: Vec<u8>,
}

impl FileHeader {
    /// Parse one central directory record from the front of `buf`.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn parse_central(buf: &[u8]) -> ZipResult<(Self, usize)> {
        if buf.len() < CDFH_MIN_SIZE {
            return Err(FormatError::MalformedCentralDirectory.into());
        }
        if &buf[0..4] != CDFH_SIGNATURE {
            return Err(FormatError::BadCentralDirectorySignature.into());
        }

        let mut cursor = Cursor::new(&buf[4..CDFH_MIN_SIZE]);
        let version_made_by = cursor.read_u16::<LittleEndian>().reading("open")?;
        let version_needed = cursor.read_u16::<LittleEndian>().reading("open")?;
        let flags = cursor.read_u16::<LittleEndian>().reading("open")?;
        let compression_method = cursor.read_u16::<LittleEndian>().reading("open")?;
        let dos_time = cursor.read_u16::<LittleEndian>().reading("open")?;
        let dos_date = cursor.read_u16::<LittleEndian>().reading("open")?;
        let crc32 = cursor.read_u32::<LittleEndian>().reading("open")?;
        let compressed_size = cursor.read_u32::<LittleEndian>().reading("open")?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().reading("open")?;
        let name_len = cursor.read_u16::<LittleEndian>().reading("open")? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>().reading("open")?;
        let comment_len = cursor.read_u16::<LittleEndian>().reading("open")? as usize;
        let _disk_number_start = cursor.read_u16::<LittleEndian>().reading("open")?;
        let internal_attr = cursor.read_u16::<LittleEndian>().reading("open")?;
        let external_attr = cursor.read_u32::<LittleEndian>().reading("open")?;
        let local_header_offset = cursor.read_u32::<LittleEndian>().reading("open")?;

        let name_end = CDFH_MIN_SIZE + name_len;
        let comment_start = name_end + extra_len as usize;
        let total = comment_start + comment_len;
        if buf.len() < total {
            return Err(FormatError::MalformedCentralDirectory.into());
        }

        let header = FileHeader {
            version_made_by,
            version_needed,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            modified: DosDateTime::new(dos_date, dos_time),
            crc32,
            compressed_size,
            uncompressed_size,
            // filled in from the local header once the directory is read
            extra_len_local: 0,
            extra_len_central: extra_len,
            internal_attr,
            external_attr,
            local_header_offset,
            file_name: buf[CDFH_MIN_SIZE..name_end].to_vec(),
            comment: buf[comment_start..total].to_vec(),
        };
        Ok((header, total))
    }

    /// Emit the local file header. The extra field is always written empty.
    pub fn write_local<W: Write>(&self, w: &mut W) -> ZipResult<()> {
        let name_len = checked_u16(self.file_name.len(), "file name")?;
        self.write_local_fields(w, name_len).during("write")
    }

    fn write_local_fields<W: Write>(&self, w: &mut W, name_len: u16) -> std::io::Result<()> {
        w.write_all(LFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_all(&self.file_name)
    }

    /// Emit the central directory record. The extra field is always written
    /// empty and the starting disk number is always 0.
    pub fn write_central<W: Write>(&self, w: &mut W) -> ZipResult<()> {
        let name_len = checked_u16(self.file_name.len(), "file name")?;
        let comment_len = checked_u16(self.comment.len(), "file comment")?;
        self.write_central_fields(w, name_len, comment_len)
            .during("write")
    }

    fn write_central_fields<W: Write>(
        &self,
        w: &mut W,
        name_len: u16,
        comment_len: u16,
    ) -> std::io::Result<()> {
        w.write_all(CDFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
        w.write_u16::<LittleEndian>(self.version_needed)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        w.write_u16::<LittleEndian>(self.modified.time)?;
        w.write_u16::<LittleEndian>(self.modified.date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size)?;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(comment_len)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(self.internal_attr)?;
        w.write_u32::<LittleEndian>(self.external_attr)?;
        w.write_u32::<LittleEndian>(self.local_header_offset)?;
        w.write_all(&self.file_name)?;
        w.write_all(&self.comment)
    }

    /// Absolute offset of the member's data, going by the local header.
    pub fn data_offset(&self) -> u64 {
        u64::from(self.local_header_offset)
            + LFH_SIZE as u64
            + self.file_name.len() as u64
            + u64::from(self.extra_len_local)
    }

    /// File name, with invalid UTF-8 replaced.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.file_name)
    }

    /// File comment, with invalid UTF-8 replaced.
    pub fn comment_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.comment)
    }

    /// Directory entries end with '/'
    pub fn is_dir(&self) -> bool {
        self.file_name.ends_with(b"/")
    }

    pub fn is_stored(&self) -> bool {
        self.compression_method == CompressionMethod::Stored
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.modified.to_datetime()
    }
}

/// The fixed part of a local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_len: u16,
    pub extra_len: u16,
}

impl LocalFileHeader {
    pub fn from_bytes(data: &[u8; LFH_SIZE]) -> ZipResult<Self> {
        if &data[0..4] != LFH_SIGNATURE {
            return Err(FormatError::BadLocalHeaderSignature.into());
        }

        let mut cursor = Cursor::new(&data[4..]);
        let version_needed = cursor.read_u16::<LittleEndian>().reading("open")?;
        let flags = cursor.read_u16::<LittleEndian>().reading("open")?;
        let compression_method = cursor.read_u16::<LittleEndian>().reading("open")?;
        let dos_time = cursor.read_u16::<LittleEndian>().reading("open")?;
        let dos_date = cursor.read_u16::<LittleEndian>().reading("open")?;

        Ok(Self {
            version_needed,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            modified: DosDateTime::new(dos_date, dos_time),
            crc32: cursor.read_u32::<LittleEndian>().reading("open")?,
            compressed_size: cursor.read_u32::<LittleEndian>().reading("open")?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().reading("open")?,
            name_len: cursor.read_u16::<LittleEndian>().reading("open")?,
            extra_len: cursor.read_u16::<LittleEndian>().reading("open")?,
        })
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> ZipResult<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(FormatError::SignatureNotFound.into());
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>().reading("open")?,
            disk_with_cd: cursor.read_u16::<LittleEndian>().reading("open")?,
            disk_entries: cursor.read_u16::<LittleEndian>().reading("open")?,
            total_entries: cursor.read_u16::<LittleEndian>().reading("open")?,
            cd_size: cursor.read_u32::<LittleEndian>().reading("open")?,
            cd_offset: cursor.read_u32::<LittleEndian>().reading("open")?,
            comment_len: cursor.read_u16::<LittleEndian>().reading("open")?,
        })
    }

    /// Single-disk record describing `entries` central directory records.
    pub fn new(entries: u16, cd_size: u32, cd_offset: u32, comment_len: u16) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
            comment_len,
        }
    }

    /// Emit the record followed by the archive comment.
    pub fn write<W: Write>(&self, w: &mut W, comment: &[u8]) -> ZipResult<()> {
        if comment.len() != usize::from(self.comment_len) {
            return Err(ZipError::Unsupported(
                "archive comment length does not match its record".to_string(),
            ));
        }
        self.write_fields(w, comment).during("write")
    }

    fn write_fields<W: Write>(&self, w: &mut W, comment: &[u8]) -> std::io::Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.disk_number)?;
        w.write_u16::<LittleEndian>(self.disk_with_cd)?;
        w.write_u16::<LittleEndian>(self.disk_entries)?;
        w.write_u16::<LittleEndian>(self.total_entries)?;
        w.write_u32::<LittleEndian>(self.cd_size)?;
        w.write_u32::<LittleEndian>(self.cd_offset)?;
        w.write_u16::<LittleEndian>(self.comment_len)?;
        w.write_all(comment)
    }
}
