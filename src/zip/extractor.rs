use log::debug;
use std::io::{self, BufWriter, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use super::crc::CrcWriter;
use super::error::{ArchiveRead, FormatError, IoContext, ZipError, ZipResult};
use super::parser::ZipParser;
use super::staged::StagedFile;
use super::structures::{FileHeader, LFH_SIZE};
use crate::io::FileSystem;

/// Where `header` lands when extracted under `root`.
///
/// Absolute names and names with `..` components would escape `root` and
/// are refused.
pub fn destination(root: &Path, header: &FileHeader) -> ZipResult<PathBuf> {
    let name = header.name_lossy();
    let mut path = root.to_path_buf();
    let mut depth = 0;
    for component in Path::new(name.as_ref()).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FormatError::UnsafeEntryName.into());
            }
        }
    }
    if depth == 0 {
        return Err(FormatError::UnsafeEntryName.into());
    }
    Ok(path)
}

fn check_method(header: &FileHeader) -> ZipResult<()> {
    if header.is_stored() {
        return Ok(());
    }
    Err(ZipError::Unsupported(format!(
        "{}: compression method {} (only stored entries can be extracted)",
        header.name_lossy(),
        header.compression_method
    )))
}

fn check_crc(header: &FileHeader, actual: u32) -> ZipResult<()> {
    if actual == header.crc32 {
        return Ok(());
    }
    Err(ZipError::Integrity {
        name: header.name_lossy().into_owned(),
        expected: header.crc32,
        actual,
    })
}

/// Position `stream` at the member's data and limit it to its length.
///
/// The local header is read again here: its extra field length decides
/// where the data starts and may differ from the central directory's.
fn member_data<'s, S: Read + Seek>(
    stream: &'s mut S,
    header: &FileHeader,
) -> ZipResult<io::Take<&'s mut S>> {
    let local = ZipParser::new(&mut *stream)?.read_local_header(header.local_header_offset)?;
    let start = u64::from(header.local_header_offset)
        + LFH_SIZE as u64
        + u64::from(local.name_len)
        + u64::from(local.extra_len);
    stream.seek(SeekFrom::Start(start)).during("extract")?;
    Ok(stream.take(u64::from(header.compressed_size)))
}

/// Read a member into memory, checking its CRC.
pub fn read_entry<S: Read + Seek>(stream: &mut S, header: &FileHeader) -> ZipResult<Vec<u8>> {
    check_method(header)?;
    let mut data = member_data(stream, header)?;
    let mut buf = Vec::new();
    data.read_to_end(&mut buf).reading("extract")?;
    if buf.len() as u64 != u64::from(header.compressed_size) {
        return Err(FormatError::UnexpectedEof.into());
    }
    check_crc(header, crc32fast::hash(&buf))?;
    Ok(buf)
}

/// Extract a member to its place under `root`.
///
/// Data is copied to a temporary file beside the destination and only
/// renamed into place once its CRC matches, so a damaged member never
/// leaves a partial destination file.
pub fn extract_entry<F: FileSystem>(
    fs: &F,
    stream: &mut F::File,
    header: &FileHeader,
    root: &Path,
    temp_suffix: &str,
) -> ZipResult<PathBuf> {
    check_method(header)?;
    let dest = destination(root, header)?;

    if header.is_dir() {
        fs.create_dir_all(&dest).during("extract")?;
        debug!("created directory {}", dest.display());
        return Ok(dest);
    }
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs.create_dir_all(parent).during("extract")?;
        }
    }

    let mut data = member_data(stream, header)?;
    let (staged, file) = StagedFile::create(fs, &dest, temp_suffix, "extract")?;
    let mut out = CrcWriter::new(BufWriter::new(file));
    let copied = io::copy(&mut data, &mut out).during("extract")?;
    if copied != u64::from(header.compressed_size) {
        return Err(FormatError::UnexpectedEof.into());
    }

    let (out, actual) = out.finish();
    let mut file = out
        .into_inner()
        .map_err(io::IntoInnerError::into_error)
        .during("extract")?;
    fs.sync(&mut file).during("extract")?;
    drop(file);

    check_crc(header, actual)?;
    staged.commit(&dest, "extract")?;
    debug!("extracted {} bytes to {}", copied, dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFs;
    use crate::zip::parser::read_directory;
    use crate::zip::parser::tests::{ONE_ENTRY, THREE_ENTRIES};
    use crate::zip::structures::CompressionMethod;
    use std::io::Cursor;

    fn first_header(archive: &[u8]) -> FileHeader {
        read_directory(&mut Cursor::new(archive)).unwrap().headers.remove(0)
    }

    fn extract(archive: &[u8]) -> (MemoryFs, ZipResult<PathBuf>) {
        let fs = MemoryFs::new();
        fs.insert("test.zip", archive.to_vec()).unwrap();
        let mut stream = fs.open(Path::new("test.zip")).unwrap();
        let header = first_header(archive);
        let result = extract_entry(&fs, &mut stream, &header, Path::new("out"), ".tmp");
        (fs, result)
    }

    #[test]
    fn well_formed_member_extracts() {
        let (fs, result) = extract(ONE_ENTRY);
        let dest = result.unwrap();
        assert_eq!(dest, PathBuf::from("out/test.txt"));
        assert_eq!(fs.read(&dest).unwrap(), b"TestBody");
        assert!(!fs.exists(Path::new("out/test.txt.tmp")));
    }

    #[test]
    fn unrelated_temp_named_files_are_left_alone() {
        let fs = MemoryFs::new();
        fs.insert("test.zip", ONE_ENTRY.to_vec()).unwrap();
        fs.insert("out/test.txt.tmp", b"precious user data".to_vec()).unwrap();
        let mut stream = fs.open(Path::new("test.zip")).unwrap();
        let header = first_header(ONE_ENTRY);

        let dest = extract_entry(&fs, &mut stream, &header, Path::new("out"), ".tmp").unwrap();

        assert_eq!(fs.read(&dest).unwrap(), b"TestBody");
        assert_eq!(fs.read("out/test.txt.tmp").unwrap(), b"precious user data");
        assert!(!fs.exists(Path::new("out/test.txt.tmp.1")));
    }

    #[test]
    fn local_extra_length_shifts_the_data() {
        // the local header claims one extra byte, so the data read starts
        // one byte late and no longer matches the CRC
        let mut data = ONE_ENTRY.to_vec();
        data[28] = 1;
        let (fs, result) = extract(&data);
        assert!(matches!(result, Err(ZipError::Integrity { .. })), "{result:?}");
        assert_eq!(fs.paths().unwrap(), vec![PathBuf::from("test.zip")]);
    }

    #[test]
    fn crc_mismatch_leaves_nothing_behind() {
        let mut data = ONE_ENTRY.to_vec();
        // first CRC byte in both the local header and the central record
        data[14] = 0xff;
        data[0x2e + 16] = 0xff;
        let (fs, result) = extract(&data);
        match result {
            Err(ZipError::Integrity { name, expected, actual }) => {
                assert_eq!(name, "test.txt");
                assert_eq!(expected, 0xb6fa03ff);
                assert_eq!(actual, 0xb6fa03e7);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!fs.exists(Path::new("out/test.txt")));
        assert!(!fs.exists(Path::new("out/test.txt.tmp")));
    }

    #[test]
    fn compressed_members_are_unsupported() {
        let fs = MemoryFs::new();
        fs.insert("test.zip", ONE_ENTRY.to_vec()).unwrap();
        let mut stream = fs.open(Path::new("test.zip")).unwrap();
        let mut header = first_header(ONE_ENTRY);
        header.compression_method = CompressionMethod::Deflate;

        let err = extract_entry(&fs, &mut stream, &header, Path::new("out"), ".tmp").unwrap_err();
        assert!(matches!(err, ZipError::Unsupported(_)), "{err:?}");
        assert!(read_entry(&mut stream, &header).is_err());
    }

    #[test]
    fn reads_members_into_memory() {
        let mut stream = Cursor::new(THREE_ENTRIES);
        let headers = read_directory(&mut stream).unwrap().headers;
        let bodies: Vec<Vec<u8>> = headers
            .iter()
            .map(|h| read_entry(&mut stream, h).unwrap())
            .collect();
        assert_eq!(bodies, vec![b"body1".to_vec(), b"body2".to_vec(), b"body3".to_vec()]);
    }

    #[test]
    fn unsafe_names_are_refused() {
        let mut header = first_header(ONE_ENTRY);
        for name in ["../evil.txt", "a/../../evil.txt", "/etc/passwd", "", "./"] {
            header.file_name = name.as_bytes().to_vec();
            let err = destination(Path::new("out"), &header).unwrap_err();
            assert_eq!(err.format(), Some(FormatError::UnsafeEntryName), "{name}");
        }

        header.file_name = b"./a/b.txt".to_vec();
        assert_eq!(
            destination(Path::new("out"), &header).unwrap(),
            PathBuf::from("out/a/b.txt")
        );
    }

    #[test]
    fn directory_entries_become_directories() {
        let fs = MemoryFs::new();
        let mut header = first_header(ONE_ENTRY);
        header.file_name = b"nested/dir/".to_vec();
        // directory entries never read the archive stream
        let mut empty = fs.create_new(Path::new("empty.zip")).unwrap();
        let dest = extract_entry(&fs, &mut empty, &header, Path::new("out"), ".tmp").unwrap();
        assert_eq!(dest, PathBuf::from("out/nested/dir"));
        assert!(fs.exists(Path::new("out/nested/dir")));
        assert!(fs.exists(Path::new("out/nested")));
    }
}
