use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use storezip::{Archive, CompressionMethod, FormatError, ZipError};
use zip::write::SimpleFileOptions;

fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored)
}

/// Build an archive with the `zip` crate.
fn build_with_zip_crate(path: &Path, members: &[(&str, &str)], comment: &str) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, data) in members {
        if name.ends_with('/') {
            writer.add_directory(*name, stored()).unwrap();
        } else {
            writer.start_file(*name, stored()).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
    }
    writer.set_comment(comment);
    writer.finish().unwrap();
}

fn names(archive: &Archive) -> Vec<String> {
    archive
        .entries()
        .iter()
        .map(|h| h.name_lossy().into_owned())
        .collect()
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

#[test]
fn removing_the_first_of_three_keeps_the_rest_extractable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("three.zip");
    build_with_zip_crate(
        &path,
        &[
            ("alpha.txt", "first member"),
            ("beta.txt", "second member"),
            ("gamma.txt", "third member"),
        ],
        "",
    );

    let mut archive = Archive::open(&path).unwrap();
    assert_eq!(names(&archive), ["alpha.txt", "beta.txt", "gamma.txt"]);

    assert!(archive.remove_file("alpha.txt").unwrap());
    assert_eq!(names(&archive), ["beta.txt", "gamma.txt"]);

    let reopened = Archive::open(&path).unwrap();
    assert_eq!(names(&reopened), ["beta.txt", "gamma.txt"]);

    let out = dir.path().join("out");
    archive.extract_all(&out).unwrap();
    assert_eq!(fs::read(out.join("beta.txt")).unwrap(), b"second member");
    assert_eq!(fs::read(out.join("gamma.txt")).unwrap(), b"third member");
    assert!(!out.join("alpha.txt").exists());
    assert!(!dir.path().join("three.zip.tmp").exists());
}

#[test]
fn added_members_read_back_with_the_zip_crate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new.zip");
    let source = dir.path().join("readme.txt");
    fs::write(&source, b"hello from storezip\n").unwrap();

    let mut archive = Archive::create(&path).unwrap();
    assert!(archive.is_empty());
    archive
        .add_file_as(&source, "docs/readme.txt", CompressionMethod::Stored)
        .unwrap();
    assert_eq!(
        archive.find("docs/readme.txt").unwrap().crc32,
        crc32fast::hash(b"hello from storezip\n")
    );

    let mut other = zip::ZipArchive::new(fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(other.len(), 1);
    let mut member = other.by_name("docs/readme.txt").unwrap();
    let mut contents = String::new();
    member.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, "hello from storezip\n");
}

#[test]
fn archive_comment_survives_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("commented.zip");
    build_with_zip_crate(&path, &[("a.txt", "a"), ("b.txt", "b")], "kept comment");
    let extra = dir.path().join("c.txt");
    fs::write(&extra, b"c").unwrap();

    let mut archive = Archive::open(&path).unwrap();
    assert_eq!(archive.comment(), b"kept comment");
    archive
        .add_file_as(&extra, "c.txt", CompressionMethod::Stored)
        .unwrap();
    archive.remove_file("a.txt").unwrap();

    let reopened = Archive::open(&path).unwrap();
    assert_eq!(reopened.comment(), b"kept comment");
    assert_eq!(names(&reopened), ["b.txt", "c.txt"]);
    assert_eq!(reopened.entries(), archive.entries());
}

#[test]
fn directories_and_nested_members_extract() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tree.zip");
    build_with_zip_crate(
        &path,
        &[
            ("top/", ""),
            ("top/empty/", ""),
            ("top/inner.txt", "inner"),
            ("root.txt", "root"),
        ],
        "",
    );

    let mut archive = Archive::open(&path).unwrap();
    let out = dir.path().join("out");
    archive.extract_all(&out).unwrap();

    assert!(out.join("top/empty").is_dir());
    assert_eq!(
        files_under(&out),
        vec![out.join("root.txt"), out.join("top/inner.txt")]
    );
    assert_eq!(fs::read(out.join("top/inner.txt")).unwrap(), b"inner");
}

#[test]
fn corrupted_data_is_not_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.zip");
    build_with_zip_crate(&path, &[("data.bin", "0123456789")], "");

    let mut bytes = fs::read(&path).unwrap();
    let at = bytes
        .windows(10)
        .position(|w| w == b"0123456789")
        .unwrap();
    bytes[at] = b'X';
    fs::write(&path, &bytes).unwrap();

    let mut archive = Archive::open(&path).unwrap();
    let out = dir.path().join("out");
    let err = archive.extract_file("data.bin", &out).unwrap_err();

    assert!(matches!(err, ZipError::Integrity { .. }), "{err:?}");
    assert!(files_under(&out).is_empty());
}

#[test]
fn non_archives_are_format_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.txt");
    fs::write(&path, b"this is not a zip archive at all").unwrap();

    let err = Archive::open(&path).unwrap_err();
    assert_eq!(err.format(), Some(FormatError::SignatureNotFound));

    let missing = Archive::open(dir.path().join("missing.zip")).unwrap_err();
    assert!(matches!(missing, ZipError::Io { operation: "open", .. }), "{missing:?}");
}
