use super::SequencerCore;
use crate::availability::AvailabilityBuffer;
use crate::error::Result;
use crate::invariants::debug_assert_bounded_claim;
use crate::sequence::Sequence;
use crate::wait::Coordinator;

/// Claim strategy for any number of producer threads.
///
/// Claims are a fetch-and-add on the shared cursor, so every producer gets a
/// disjoint range. Because producers finish writing in any order, the cursor
/// only bounds what *might* be published; the availability buffer records
/// which slots actually are.
pub(crate) struct MultiProducer {
    /// Last gating value observed by any producer. Always a value gating
    /// really held, so always a safe lower bound. Shared between producers,
    /// so it is stored with release and read with acquire: a producer that
    /// trusts another's cached value inherits its edge with the consumer's
    /// release of gating.
    cached: Sequence,
    availability: AvailabilityBuffer,
}

impl MultiProducer {
    pub(super) fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            cached: Sequence::default(),
            availability: AvailabilityBuffer::new(capacity)?,
        })
    }

    pub(super) fn next(&self, core: &SequencerCore, coordinator: &Coordinator, n: i64) -> i64 {
        let next = core.cursor.get_and_add(n) + n;
        let wrap_point = next - core.capacity;

        let mut cached = self.cached.get_acquire();
        if wrap_point > cached {
            cached = core.await_gating(coordinator, wrap_point);
            self.cached.set_release(cached);
        }

        debug_assert_bounded_claim!(next, cached, core.capacity);
        next
    }

    pub(super) fn try_next(&self, core: &SequencerCore, n: i64) -> Option<i64> {
        loop {
            let current = core.cursor.get_acquire();
            let next = current + n;
            let wrap_point = next - core.capacity;

            if wrap_point > self.cached.get_acquire() {
                let gating = core.gating.get_acquire();
                self.cached.set_release(gating);
                if wrap_point > gating {
                    return None;
                }
            }

            if core.cursor.compare_and_set(current, next) {
                return Some(next);
            }
        }
    }

    #[inline]
    pub(super) fn publish(&self, sequence: i64) {
        self.availability.set(sequence);
    }

    #[inline]
    pub(super) fn publish_range(&self, low: i64, high: i64) {
        self.availability.set_range(low, high);
    }

    #[inline]
    pub(super) fn highest_published(&self, next: i64, available: i64) -> i64 {
        self.availability.get_available(next, available)
    }

    #[inline]
    pub(super) fn is_published(&self, sequence: i64) -> bool {
        self.availability.is_available(sequence)
    }
}
