//! The single abort token shared between the SIGINT handler, the directory
//! walker, and every file's supervisor loop.
//!
//! There is only ever one download in flight per process (a whole directory
//! tree downloads sequentially, one file at a time), so this is a single
//! token rather than a job-id keyed registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A clonable handle to the process-wide abort flag. `request()` is called
/// from the SIGINT handler; `is_requested()` is polled by the walker and the
/// supervisor's run loop.
#[derive(Clone, Default)]
pub struct AbortController {
    flag: Arc<AtomicBool>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Borrows the raw flag, for code (like [`crate::supervisor::Supervisor::run`])
    /// that wants an `&AtomicBool` rather than a clone of this handle.
    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_visible_through_clones() {
        let controller = AbortController::new();
        let clone = controller.clone();
        assert!(!clone.is_requested());
        controller.request();
        assert!(clone.is_requested());
    }
}
