//! The blockmap type: init, allocate, mutate, and report on block status.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::io::{persist_blockmap, read_blockmap};
use super::status::{BlockStatus, PENDING_IDS};
use super::BlockmapError;

/// A contiguous byte range assigned to a worker by `allocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub byte_offset: u64,
    pub blocks: usize,
}

/// Aggregate statistics returned by `get_statistics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub non_downloaded_blocks: usize,
    pub available_blocks: usize,
    pub total_blocks: usize,
    pub blocksize: u64,
    pub eta: String,
}

/// Tracks per-block download status for one file, persisted to
/// `<local_path>.blockmap`. See module docs: never cached in memory across
/// calls.
pub struct Blockmap {
    blockmap_path: PathBuf,
    min_blocks_per_segment: usize,
    max_blocks_per_segment: usize,
    initial_blocksize: u64,
}

impl Blockmap {
    /// Builds a blockmap handle for `local_path`. Does not touch disk.
    /// Rejects `local_path` that names an existing directory.
    pub fn new(
        local_path: &Path,
        min_blocks_per_segment: usize,
        max_blocks_per_segment: usize,
        initial_blocksize: u64,
    ) -> Result<Self, BlockmapError> {
        if local_path.is_dir() {
            return Err(BlockmapError::LocalPathIsDirectory(
                local_path.display().to_string(),
            ));
        }
        let mut blockmap_path = local_path.as_os_str().to_owned();
        blockmap_path.push(".blockmap");
        Ok(Blockmap {
            blockmap_path: PathBuf::from(blockmap_path),
            min_blocks_per_segment,
            max_blocks_per_segment,
            initial_blocksize,
        })
    }

    pub fn path(&self) -> &Path {
        &self.blockmap_path
    }

    /// True if a blockmap sidecar already exists on disk.
    pub fn exists(&self) -> bool {
        self.blockmap_path.exists()
    }

    /// Creates a fresh all-`AVAILABLE` blockmap sized for `file_size`, or, if
    /// one already exists, sanitizes it: every non-`DOWNLOADED` character
    /// becomes `AVAILABLE` (invariant 3/5: `PENDING`/`SAVING` never survive a
    /// restart). The existing header's blocksize wins over
    /// `initial_blocksize` when resuming.
    pub fn init(&self, file_size: u64) -> Result<(), BlockmapError> {
        if !self.exists() {
            let blocksize = self.initial_blocksize;
            let n = if file_size == 0 { 0 } else { file_size.div_ceil(blocksize) };
            let blockmap = BlockStatus::AVAILABLE.to_string().repeat(n as usize);
            persist_blockmap(&self.blockmap_path, blocksize, &blockmap)?;
        } else {
            let (blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
            let sanitized: String = blockmap
                .chars()
                .map(|c| if c == BlockStatus::DOWNLOADED { c } else { BlockStatus::AVAILABLE })
                .collect();
            persist_blockmap(&self.blockmap_path, blocksize, &sanitized)?;
        }
        Ok(())
    }

    /// Allocates the longest contiguous run of `AVAILABLE` blocks across the
    /// given idle `worker_ids`, in order. Per-worker slice size is
    /// `clamp(ceil(run_len / workers), min_blocks_per_segment, max_blocks_per_segment)`.
    /// Workers beyond the end of the run get nothing this round. Returns
    /// empty if there is no available run or no workers.
    pub fn allocate(&self, worker_ids: &[char]) -> Result<HashMap<char, Allocation>, BlockmapError> {
        let mut result = HashMap::new();
        if worker_ids.is_empty() {
            return Ok(result);
        }

        let (blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
        let chars: Vec<char> = blockmap.chars().collect();
        let len = chars.len();

        let run = (1..=len)
            .rev()
            .find_map(|segment_size| find_run(&chars, segment_size).map(|start| (start, segment_size)));

        let Some((start_block, mut remaining)) = run else {
            return Ok(result);
        };

        let optimal = (remaining as f64 / worker_ids.len() as f64).ceil() as usize;
        let optimal = optimal.clamp(self.min_blocks_per_segment, self.max_blocks_per_segment);

        let mut updated = chars;
        let mut x = start_block;
        for &worker_id in worker_ids {
            if remaining == 0 {
                break;
            }
            let blocks = remaining.min(optimal);
            for slot in updated.iter_mut().skip(x).take(blocks) {
                *slot = worker_id;
            }
            result.insert(
                worker_id,
                Allocation {
                    byte_offset: x as u64 * blocksize,
                    blocks,
                },
            );
            x += blocks;
            remaining -= blocks;
        }

        let new_blockmap: String = updated.into_iter().collect();
        persist_blockmap(&self.blockmap_path, blocksize, &new_blockmap)?;
        Ok(result)
    }

    /// Rewrites the status of `blocks` blocks starting at `byte_offset`.
    /// `byte_offset` must be a multiple of the blockmap's blocksize; `status`
    /// must be a character from the alphabet.
    pub fn change_block_range_status(
        &self,
        byte_offset: u64,
        blocks: usize,
        status: char,
    ) -> Result<(), BlockmapError> {
        let (blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
        if byte_offset % blocksize != 0 {
            return Err(BlockmapError::MisalignedOffset { offset: byte_offset, blocksize });
        }
        if !BlockStatus::is_valid_char(status) {
            return Err(BlockmapError::InvalidStatus(status));
        }

        let starting_block = (byte_offset / blocksize) as usize;
        let mut chars: Vec<char> = blockmap.chars().collect();
        for slot in chars.iter_mut().skip(starting_block).take(blocks) {
            *slot = status;
        }
        let new_blockmap: String = chars.into_iter().collect();
        persist_blockmap(&self.blockmap_path, blocksize, &new_blockmap)?;
        Ok(())
    }

    /// Replaces every occurrence of `old_status` with `new_status` across the
    /// whole blockmap. Used on worker abort/finish to reclaim pending blocks.
    pub fn change_status(&self, old_status: char, new_status: char) -> Result<(), BlockmapError> {
        if !BlockStatus::is_valid_char(old_status) {
            return Err(BlockmapError::InvalidStatus(old_status));
        }
        if !BlockStatus::is_valid_char(new_status) {
            return Err(BlockmapError::InvalidStatus(new_status));
        }
        let (blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
        let new_blockmap = blockmap.replace(old_status, &new_status.to_string());
        persist_blockmap(&self.blockmap_path, blocksize, &new_blockmap)?;
        Ok(())
    }

    /// The raw status string, for rendering (e.g. the full ANSI display).
    pub fn render(&self) -> Result<String, BlockmapError> {
        let (_blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
        Ok(blockmap)
    }

    /// Returns (non-downloaded, available, total, blocksize, ETA string).
    pub fn get_statistics(&self, dl_speed: f64) -> Result<Statistics, BlockmapError> {
        let (blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
        let total = blockmap.chars().count();
        let downloaded = blockmap.chars().filter(|&c| c == BlockStatus::DOWNLOADED).count();
        let available = blockmap.chars().filter(|&c| c == BlockStatus::AVAILABLE).count();
        let non_downloaded = total - downloaded;

        let eta = if dl_speed == 0.0 {
            if non_downloaded == 0 { "done".to_string() } else { "infinite".to_string() }
        } else {
            let seconds = (non_downloaded as f64 * blocksize as f64) / dl_speed;
            if seconds < 120.0 {
                format!("{} seconds", seconds as i64)
            } else {
                format!("{:.1} minutes", seconds / 60.0)
            }
        };

        Ok(Statistics {
            non_downloaded_blocks: non_downloaded,
            available_blocks: available,
            total_blocks: total,
            blocksize,
            eta,
        })
    }

    /// True iff every block is `DOWNLOADED`.
    pub fn is_complete(&self) -> Result<bool, BlockmapError> {
        let (_blocksize, blockmap) = read_blockmap(&self.blockmap_path)?;
        Ok(blockmap.chars().all(|c| c == BlockStatus::DOWNLOADED))
    }

    /// Removes the sidecar file.
    pub fn delete(&self) -> Result<(), BlockmapError> {
        std::fs::remove_file(&self.blockmap_path)?;
        Ok(())
    }
}

/// Finds the start index of the first run of `len` consecutive `AVAILABLE`
/// characters, scanning left to right (ties broken by smallest start index).
fn find_run(chars: &[char], len: usize) -> Option<usize> {
    if len == 0 || chars.len() < len {
        return None;
    }
    chars
        .windows(len)
        .position(|w| w.iter().all(|&c| c == BlockStatus::AVAILABLE))
}

#[allow(dead_code)]
const _PENDING_IDS_USED_IN_TESTS: &str = PENDING_IDS;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn blockmap_at(dir: &Path, name: &str) -> Blockmap {
        Blockmap::new(&dir.join(name), 1, 3, 1_048_576).unwrap()
    }

    #[test]
    fn new_rejects_directory_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Blockmap::new(dir.path(), 1, 3, 1024).unwrap_err();
        assert!(matches!(err, BlockmapError::LocalPathIsDirectory(_)));
    }

    #[test]
    fn init_creates_all_available_sized_for_filesize() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        bm.init(2_000_000).unwrap();
        let (blocksize, s) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(blocksize, 1_048_576);
        assert_eq!(s.len(), 2); // ceil(2_000_000 / 1_048_576) == 2
        assert!(s.chars().all(|c| c == '.'));
    }

    #[test]
    fn init_sanitizes_existing_blockmap_keeping_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1_048_576, "*_12.").unwrap();
        bm.init(5 * 1_048_576).unwrap();
        let (blocksize, s) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(blocksize, 1_048_576); // existing header wins over initial_blocksize
        assert_eq!(s, "*....");
    }

    #[test]
    fn allocate_s2_pattern_from_spec() {
        let dir = tempfile::tempdir().unwrap();
        let bm = Blockmap::new(&dir.join("out.bin"), 1, 3, 1_048_576).unwrap();
        persist_blockmap(&bm.blockmap_path, 1_048_576, "........").unwrap();

        let a1 = bm.allocate(&['0']).unwrap();
        assert_eq!(a1[&'0'], Allocation { byte_offset: 0, blocks: 3 });
        let (_, s1) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(s1, "000.....");

        let a2 = bm.allocate(&['1']).unwrap();
        assert_eq!(a2[&'1'], Allocation { byte_offset: 3 * 1_048_576, blocks: 3 });
        let (_, s2) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(s2, "000111..");

        bm.change_block_range_status(1 * 1_048_576, 3, '.').unwrap();
        let a3 = bm.allocate(&['2']).unwrap();
        assert_eq!(a3[&'2'], Allocation { byte_offset: 1 * 1_048_576, blocks: 3 });
        let (_, s3) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(s3, "022211..");
    }

    #[test]
    fn allocate_s3_simultaneous_multi_worker() {
        let dir = tempfile::tempdir().unwrap();
        let bm = Blockmap::new(&dir.join("out.bin"), 1, 3, 1_048_576).unwrap();
        bm.init(8 * 1_048_576).unwrap();

        let allocations = bm.allocate(&['0', '1', '2']).unwrap();
        assert_eq!(allocations.len(), 3);
        let (_, s) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(s, "00011122");
    }

    #[test]
    fn allocate_returns_empty_when_no_available_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1_048_576, "****").unwrap();
        assert!(bm.allocate(&['0']).unwrap().is_empty());
    }

    #[test]
    fn allocate_returns_empty_for_no_workers() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1_048_576, "....").unwrap();
        assert!(bm.allocate(&[]).unwrap().is_empty());
    }

    #[test]
    fn change_block_range_status_rejects_misaligned_offset() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "....").unwrap();
        let err = bm.change_block_range_status(100, 1, '*').unwrap_err();
        assert!(matches!(err, BlockmapError::MisalignedOffset { .. }));
    }

    #[test]
    fn change_block_range_status_rejects_invalid_status() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "....").unwrap();
        let err = bm.change_block_range_status(0, 1, 'x').unwrap_err();
        assert!(matches!(err, BlockmapError::InvalidStatus('x')));
    }

    #[test]
    fn change_status_replaces_all_matching() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "2.2*2").unwrap();
        bm.change_status('2', '.').unwrap();
        let (_, s) = read_blockmap(&bm.blockmap_path).unwrap();
        assert_eq!(s, "....*.");
    }

    #[test]
    fn statistics_eta_done_when_complete() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "**").unwrap();
        let stats = bm.get_statistics(0.0).unwrap();
        assert_eq!(stats.eta, "done");
        assert_eq!(stats.non_downloaded_blocks, 0);
        assert!(bm.is_complete().unwrap());
    }

    #[test]
    fn statistics_eta_infinite_when_speed_zero_and_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "*.").unwrap();
        let stats = bm.get_statistics(0.0).unwrap();
        assert_eq!(stats.eta, "infinite");
        assert!(!bm.is_complete().unwrap());
    }

    #[test]
    fn statistics_eta_seconds_vs_minutes() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        // 1 non-downloaded block of 1MB at 1MB/sec => ~1 second
        persist_blockmap(&bm.blockmap_path, 1_048_576, ".").unwrap();
        let stats = bm.get_statistics(1_048_576.0).unwrap();
        assert_eq!(stats.eta, "1 seconds");

        // 1000 blocks of 1MB at 1MB/sec => far more than 120 seconds
        let blockmap: String = ".".repeat(1000);
        persist_blockmap(&bm.blockmap_path, 1_048_576, &blockmap).unwrap();
        let stats = bm.get_statistics(1_048_576.0).unwrap();
        assert!(stats.eta.ends_with("minutes"));
    }

    #[test]
    fn delete_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "*").unwrap();
        assert!(bm.exists());
        bm.delete().unwrap();
        assert!(!bm.exists());
        // double-check it really touched the filesystem, not just state
        assert!(!fs::metadata(&bm.blockmap_path).is_ok());
    }

    #[test]
    fn resume_sanitizes_pending_and_saving_but_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let bm = blockmap_at(dir.path(), "out.bin");
        persist_blockmap(&bm.blockmap_path, 1024, "0123456789ABCDEF_*").unwrap();
        bm.init(19 * 1024).unwrap();
        let (_, s) = read_blockmap(&bm.blockmap_path).unwrap();
        for c in s.chars() {
            assert!(c == '.' || c == '*');
        }
        assert!(s.ends_with('*'));
    }
}
