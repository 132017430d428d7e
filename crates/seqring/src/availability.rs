use crate::error::{check_capacity, Result};
use crate::sync::{fence, AtomicI32, Ordering};
use std::fmt;

/// Cells of padding on each side of the flag array (one cache line).
const PADDING: usize = 64 / std::mem::size_of::<i32>();

// =============================================================================
// WHY A FLAG PER SLOT
// =============================================================================
//
// With several producers, `cursor.get_and_add(n)` hands out disjoint ranges,
// but the producers finish writing in any order. The cursor therefore only
// says what has been *claimed*. Each slot carries the lap (`sequence >> log2
// (capacity)`) of the last publish into it, so a consumer asking "is sequence
// S published?" compares the slot's flag with S's lap. A stale flag from an
// earlier lap never matches, which is what keeps wraparound from looking like
// a completed publish.
//
// Memory ordering:
// - `set`:           Release store of the flag after the slot write
// - `set_range`:     one Release fence, then Relaxed flag stores; every store
//                    after the fence carries the fence's release edge
// - `is_available`:  Acquire load of the flag
// - `get_available`: Relaxed scan, then one Acquire fence covering every flag
//                    read during the scan
//
// Laps are truncated to 32 bits. Two sequences alias only when they are 2^32
// laps apart, which can never both be in flight.
//
// =============================================================================

/// Per-slot publication flags for multi-producer rings.
pub struct AvailabilityBuffer {
    flags: Box<[AtomicI32]>,
    mask: i64,
    shift: u32,
}

impl AvailabilityBuffer {
    /// Creates a buffer for a ring of `capacity` slots with every flag at -1.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = check_capacity(capacity)?;
        let flags = (0..capacity + 2 * PADDING)
            .map(|_| AtomicI32::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            flags,
            mask: capacity as i64 - 1,
            shift: capacity.trailing_zeros(),
        })
    }

    /// Number of slots tracked.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.flags.len() - 2 * PADDING
    }

    #[inline]
    fn cell(&self, sequence: i64) -> &AtomicI32 {
        &self.flags[(sequence & self.mask) as usize + PADDING]
    }

    #[inline]
    fn lap(&self, sequence: i64) -> i32 {
        (sequence >> self.shift) as i32
    }

    /// Marks `sequence` published.
    #[inline]
    pub fn set(&self, sequence: i64) {
        self.cell(sequence).store(self.lap(sequence), Ordering::Release);
    }

    /// Marks every sequence in `low..=high` published with a single fence.
    pub fn set_range(&self, low: i64, high: i64) {
        fence(Ordering::Release);
        for sequence in low..=high {
            self.cell(sequence).store(self.lap(sequence), Ordering::Relaxed);
        }
    }

    /// Returns `true` if the publish for this exact lap of `sequence` is
    /// visible.
    #[inline]
    pub fn is_available(&self, sequence: i64) -> bool {
        self.cell(sequence).load(Ordering::Acquire) == self.lap(sequence)
    }

    /// Highest sequence `h` in `low..=high` such that every sequence in
    /// `low..=h` is published, or `low - 1` if `low` itself is not.
    pub fn get_available(&self, low: i64, high: i64) -> i64 {
        let mut sequence = low;
        while sequence <= high {
            if self.cell(sequence).load(Ordering::Relaxed) != self.lap(sequence) {
                break;
            }
            sequence += 1;
        }
        fence(Ordering::Acquire);
        sequence - 1
    }
}

impl fmt::Debug for AvailabilityBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvailabilityBuffer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
