//! Writes downloaded bytes to the output file.
//!
//! Unlike a long-lived writer with a cached file handle, the supervisor is
//! the only writer and opens the output file fresh for each coalesced batch
//! of blocks, then closes it again. There is exactly one `pwrite` per batch;
//! no handle is held between batches, so nothing here needs to be `Send` or
//! `Clone`.

use std::fs::File;
use std::io;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Creates `path` as an empty file if it does not already exist. Does not
/// truncate or touch an existing file: resuming a partial download must not
/// lose bytes already on disk.
pub fn ensure_local_file(path: &Path) -> io::Result<()> {
    if !path.exists() {
        File::create(path)?;
    }
    Ok(())
}

/// Writes `data` at `offset` into the file at `path`, opening it for this
/// call only. Returns an error on a short write rather than silently
/// truncating the batch.
pub fn write_at(path: &Path, offset: u64, data: &[u8]) -> io::Result<()> {
    let file = File::options().write(true).open(path)?;
    write_at_impl(&file, offset, data)
}

#[cfg(unix)]
fn write_at_impl(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
    let n = file.write_at(data, offset)?;
    if n != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write at offset {offset}: wrote {n} of {} bytes", data.len()),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_at_impl(file: &File, offset: u64, data: &[u8]) -> io::Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_local_file_creates_empty_file_without_truncating_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        ensure_local_file(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        write_at(&path, 0, b"hello").unwrap();
        ensure_local_file(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn write_at_places_bytes_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        ensure_local_file(&path).unwrap();
        std::fs::write(&path, [0u8; 10]).unwrap();

        write_at(&path, 4, b"abcd").unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(&contents[4..8], b"abcd");
        assert_eq!(&contents[0..4], &[0u8; 4]);
    }

    #[test]
    fn write_at_errors_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        assert!(write_at(&path, 0, b"x").is_err());
    }
}
