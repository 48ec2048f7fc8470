use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Inter-thread cancellation flag shared between a reader and whoever wants to stop it.
///
/// The reader checks it once per wait iteration while a PICC exchange is pending, and the
/// exchange that sees the cancel clears it again.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token.  Clone it to pass it to another thread
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    /// Flips the state of the token to canceled
    #[inline]
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// Checks if the token has been canceled
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Clears the token, returning whether it was canceled
    #[inline]
    pub fn take(&self) -> bool {
        self.canceled.swap(false, Ordering::AcqRel)
    }

    /// Re-arms the token for every clone, so a reader can be used again after a cancel
    #[inline]
    pub fn reset(&self) {
        self.canceled.store(false, Ordering::Release);
    }
}
