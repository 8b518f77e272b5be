//! Reading and writing the two-line blockmap sidecar file.

use std::path::Path;

/// Reads the blockmap sidecar: first line is the decimal blocksize, second
/// line is the status string.
pub(super) fn read_blockmap(path: &Path) -> std::io::Result<(u64, String)> {
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.splitn(2, '\n');
    let blocksize_line = lines.next().unwrap_or_default();
    let rest = lines.next().unwrap_or_default();
    let blocksize = blocksize_line.trim().parse::<u64>().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid blocksize header in {}: {}", path.display(), e),
        )
    })?;
    Ok((blocksize, rest.trim_end_matches('\n').to_string()))
}

/// Writes the blockmap sidecar in full. Not atomic; a plain truncate-and-write
/// is sufficient since the blockmap is the source of truth and any partial
/// write is recovered by `init`'s sanitize pass.
pub(super) fn persist_blockmap(path: &Path, blocksize: u64, blockmap: &str) -> std::io::Result<()> {
    std::fs::write(path, format!("{}\n{}", blocksize, blockmap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin.blockmap");
        persist_blockmap(&path, 1048576, "...*_").unwrap();
        let (blocksize, blockmap) = read_blockmap(&path).unwrap();
        assert_eq!(blocksize, 1048576);
        assert_eq!(blockmap, "...*_");
    }
}
