//! Positional file I/O.
//!
//! Record files and index files are read and written at explicit byte
//! positions so that concurrent readers never share (or race on) a file
//! cursor with the writer.

use std::fs::File;
use std::io;

/// Read exactly `buf.len()` bytes starting at `position`.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], position: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, position)
}

/// Write all of `buf` starting at `position`.
#[cfg(unix)]
pub(crate) fn write_all_at(file: &File, buf: &[u8], position: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, position)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut position: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, position) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                position += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
pub(crate) fn write_all_at(file: &File, mut buf: &[u8], mut position: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, position) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ))
            }
            Ok(n) => {
                buf = &buf[n..];
                position += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_write_then_read_at() {
        let file = tempfile().unwrap();
        write_all_at(&file, b"hello", 0).unwrap();
        write_all_at(&file, b"world", 5).unwrap();

        let mut buf = [0u8; 5];
        read_exact_at(&file, &mut buf, 5).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn test_short_read_is_eof() {
        let file = tempfile().unwrap();
        write_all_at(&file, b"abc", 0).unwrap();

        let mut buf = [0u8; 8];
        let err = read_exact_at(&file, &mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
