//! CRC-32 (IEEE) over streamed data.

use crc32fast::Hasher;
use std::io::{self, Read, Write};

const CHUNK: usize = 64 * 1024;

/// Checksum everything `reader` yields, returning the CRC and byte count.
pub fn checksum<R: Read + ?Sized>(reader: &mut R) -> io::Result<(u32, u64)> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize(), total))
}

/// A writer that checksums everything passed through it.
pub struct CrcWriter<W> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// Returns the inner writer and the CRC of what was written.
    pub fn finish(self) -> (W, u32) {
        (self.inner, self.hasher.finalize())
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn matches_known_values() {
        // "body1" from the three-entry fixture
        assert_eq!(checksum(&mut Cursor::new(b"body1")).unwrap(), (0xa668951c, 5));
        assert_eq!(checksum(&mut io::empty()).unwrap(), (0, 0));
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let (crc, len) = checksum(&mut Cursor::new(&data)).unwrap();
        assert_eq!(crc, crc32fast::hash(&data));
        assert_eq!(len, data.len() as u64);

        let mut writer = CrcWriter::new(Vec::new());
        for chunk in data.chunks(7919) {
            writer.write_all(chunk).unwrap();
        }
        let (out, crc) = writer.finish();
        assert_eq!(out, data);
        assert_eq!(crc, crc32fast::hash(&data));
    }
}
