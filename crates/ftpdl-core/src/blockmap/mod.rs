//! Persistent per-block status for a single download.
//!
//! The blockmap is always read from disk and never kept in memory across
//! calls: every mutating operation reads the sidecar file, mutates the status
//! string, and writes the whole file back. A crash between operations is
//! always consistent with some valid intermediate state, and resumption after
//! a crash works by treating any block that isn't `DOWNLOADED` as `AVAILABLE`
//! (see `init`).

mod io;
mod ops;
mod status;

pub use ops::{Allocation, Blockmap, Statistics};
pub use status::{BlockStatus, PENDING_IDS};

/// Errors raised by blockmap mutators. These are fatal: the caller should not
/// attempt to continue the download after one of these.
#[derive(Debug, thiserror::Error)]
pub enum BlockmapError {
    #[error("local path \"{0}\" is a directory, must be a file")]
    LocalPathIsDirectory(String),

    #[error("byte_offset {offset} is not a multiple of block size {blocksize}")]
    MisalignedOffset { offset: u64, blocksize: u64 },

    #[error("status '{0}' is not a valid blockmap status")]
    InvalidStatus(char),

    #[error("blockmap I/O error: {0}")]
    Io(#[from] std::io::Error),
}
