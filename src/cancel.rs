//! Cooperative cancellation for live runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "keep running" flag.
///
/// Cloned into whoever may stop the run (a Ctrl-C handler, a UI toggle). The
/// camera source polls it once per frame, before capturing, so a frame that is
/// already being analyzed always finishes.
#[derive(Clone, Debug)]
pub struct CancelToken {
    running: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_running()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
