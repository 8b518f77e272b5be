//! The blockmap status alphabet.

/// Alphabet of characters the blockmap status string may contain.
pub const PENDING_IDS: &str = "0123456789ABCDEF";

/// A single block's status, as stored in the blockmap string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Not yet assigned; may be allocated to a worker.
    Available,
    /// Bytes received by the supervisor, not yet flushed to disk.
    Saving,
    /// Bytes durably written to disk at the correct offset.
    Downloaded,
    /// Assigned to worker `id` (one hex digit `0..F`); bytes not yet received.
    Pending(char),
}

impl BlockStatus {
    pub const DOWNLOADED: char = '*';
    pub const AVAILABLE: char = '.';
    pub const SAVING: char = '_';

    /// Parses a single status character. Returns `None` if it isn't in the alphabet.
    pub fn from_char(c: char) -> Option<BlockStatus> {
        match c {
            Self::DOWNLOADED => Some(BlockStatus::Downloaded),
            Self::AVAILABLE => Some(BlockStatus::Available),
            Self::SAVING => Some(BlockStatus::Saving),
            w if PENDING_IDS.contains(w) => Some(BlockStatus::Pending(w)),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            BlockStatus::Downloaded => Self::DOWNLOADED,
            BlockStatus::Available => Self::AVAILABLE,
            BlockStatus::Saving => Self::SAVING,
            BlockStatus::Pending(w) => w,
        }
    }

    /// True if `c` is any valid status character (including a pending worker id).
    pub fn is_valid_char(c: char) -> bool {
        c == Self::DOWNLOADED || c == Self::AVAILABLE || c == Self::SAVING || PENDING_IDS.contains(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_every_alphabet_character() {
        for c in ['*', '.', '_'].into_iter().chain(PENDING_IDS.chars()) {
            let status = BlockStatus::from_char(c).unwrap();
            assert_eq!(status.to_char(), c);
        }
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(BlockStatus::from_char('x').is_none());
        assert!(!BlockStatus::is_valid_char('x'));
        assert!(BlockStatus::is_valid_char('7'));
    }
}
