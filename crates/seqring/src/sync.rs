//! Synchronization primitives used by the crate.
//!
//! Under `--features loom` every atomic, lock and spin hint is swapped for
//! loom's model-checked counterpart so the loom test target can explore the
//! claim/publish/poll protocol exhaustively.

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
#[cfg(feature = "loom")]
pub(crate) use loom::sync::{Condvar, Mutex};

#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::{fence, AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::{Condvar, Mutex};

/// CPU relax hint inside a busy-wait loop.
#[inline]
pub(crate) fn spin_loop() {
    #[cfg(feature = "loom")]
    loom::hint::spin_loop();
    #[cfg(not(feature = "loom"))]
    std::hint::spin_loop();
}

/// Gives up the rest of the time slice.
#[inline]
pub(crate) fn yield_now() {
    #[cfg(feature = "loom")]
    loom::thread::yield_now();
    #[cfg(not(feature = "loom"))]
    std::thread::yield_now();
}

/// Parks the calling thread for the shortest period the OS allows.
///
/// Loom has no timed park, so the model treats this as a yield.
#[inline]
pub(crate) fn park_briefly() {
    #[cfg(feature = "loom")]
    loom::thread::yield_now();
    #[cfg(not(feature = "loom"))]
    std::thread::park_timeout(std::time::Duration::from_nanos(1));
}

/// Escalating busy-wait for handoffs between threads: spins with growing
/// PAUSE bursts, then yields.
pub(crate) struct Snooze {
    #[cfg(not(feature = "loom"))]
    backoff: crossbeam_utils::Backoff,
}

impl Snooze {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            #[cfg(not(feature = "loom"))]
            backoff: crossbeam_utils::Backoff::new(),
        }
    }

    #[inline]
    pub(crate) fn snooze(&self) {
        #[cfg(feature = "loom")]
        loom::thread::yield_now();
        #[cfg(not(feature = "loom"))]
        self.backoff.snooze();
    }
}
