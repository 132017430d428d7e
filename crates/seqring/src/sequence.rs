use crate::sync::{AtomicBool, AtomicI64, Ordering};
use crossbeam_utils::CachePadded;
use std::fmt;

// =============================================================================
// ACCESS MODES
// =============================================================================
//
// Every coordination point in the crate is a `Sequence`. The access mode is
// chosen by the caller, not by the type, so each call site states exactly
// which happens-before edge it relies on:
//
// - plain   (Relaxed): single-writer fast paths, e.g. the consumer reading its
//                      own gating sequence or the single producer its claim
// - acquire (Acquire): a consumer observing producer progress, or a producer
//                      observing consumer progress
// - release (Release): publishing a cursor or gating value after the slot
//                      writes/reads it covers
// - RMW     (AcqRel/SeqCst): contended counters (multi-producer claim,
//                      competing-consumer claim, gating advance)
//
// The value lives on its own cache line pair (`CachePadded`), so two hot
// sequences owned by different threads never share a line.
//
// =============================================================================

/// Padded 64-bit sequence counter.
///
/// Starts at [`Sequence::INITIAL_VALUE`] (`-1`, "nothing yet") and only ever
/// moves forward.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Value of a sequence before anything has been claimed, published or
    /// consumed.
    pub const INITIAL_VALUE: i64 = -1;

    /// Creates a sequence with the given starting value.
    pub fn new(value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(value)),
        }
    }

    /// Reads without ordering. Only meaningful to the thread that writes it.
    #[inline]
    pub fn get_plain(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Writes without ordering.
    #[inline]
    pub fn set_plain(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Reads with acquire ordering: every write made before the matching
    /// release store is visible after this returns.
    #[inline]
    pub fn get_acquire(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Writes with release ordering: every prior write becomes visible to a
    /// thread that acquires this value.
    #[inline]
    pub fn set_release(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Atomically adds `delta` and returns the previous value.
    #[inline]
    pub fn get_and_add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel)
    }

    /// Strong compare-and-swap with full ordering.
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }

    /// Weak compare-and-swap; may fail spuriously, so only use it in a retry
    /// loop.
    #[inline]
    pub fn weak_compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange_weak(expected, new, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(Self::INITIAL_VALUE)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.get_acquire()).finish()
    }
}

/// Cache-line padded boolean.
///
/// Used as the cooperative stop flag of a worker and as the admission flag
/// of a single producer or consumer handle. Access modes follow
/// [`Sequence`].
pub struct PaddedFlag {
    value: CachePadded<AtomicBool>,
}

impl PaddedFlag {
    /// Creates a flag with the given starting value.
    pub fn new(value: bool) -> Self {
        Self {
            value: CachePadded::new(AtomicBool::new(value)),
        }
    }

    /// Reads without ordering.
    #[inline]
    pub fn get_plain(&self) -> bool {
        self.value.load(Ordering::Relaxed)
    }

    /// Writes without ordering.
    #[inline]
    pub fn set_plain(&self, value: bool) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Reads with acquire ordering; pairs with [`set_release`](Self::set_release).
    #[inline]
    pub fn get_acquire(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    /// Writes with release ordering, publishing everything the caller did
    /// before.
    #[inline]
    pub fn set_release(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    /// Returns `true` if the flag was `expected` and is now `new`.
    ///
    /// A successful swap acquires whatever the last release store published.
    #[inline]
    pub fn compare_and_set(&self, expected: bool, new: bool) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for PaddedFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for PaddedFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PaddedFlag").field(&self.get_acquire()).finish()
    }
}
