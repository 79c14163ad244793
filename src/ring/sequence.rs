use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Cursor value before anything has been published or released.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// A sequence counter padded to its own cache line pair, so the producer's
/// cursor and the consumer's gating sequence never share a line.
#[repr(align(128))]
pub struct Sequence(AtomicI64);

impl Sequence {
    pub fn new(value: i64) -> Self {
        Self(AtomicI64::new(value))
    }

    /// Acquire load: everything written before the matching [`set`](Self::set)
    /// is visible to the caller.
    #[inline]
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    /// Release store.
    #[inline]
    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Release);
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.get()).finish()
    }
}
