use super::SequencerCore;
use crate::invariants::{debug_assert_bounded_claim, debug_assert_monotonic};
use crate::sequence::Sequence;
use crate::wait::Coordinator;

/// Claim strategy for exactly one producer thread.
///
/// The claim counter and the cached gating value are touched only by the
/// producer, so claiming needs no read-modify-write. Publication is always
/// contiguous, which makes the cursor itself the published frontier.
pub(crate) struct SingleProducer {
    /// Last claimed sequence.
    sequence: Sequence,
    /// Last observed gating sequence.
    cached: Sequence,
}

impl SingleProducer {
    pub(super) fn new() -> Self {
        Self {
            sequence: Sequence::default(),
            cached: Sequence::default(),
        }
    }

    pub(super) fn next(&self, core: &SequencerCore, coordinator: &Coordinator, n: i64) -> i64 {
        let next = self.sequence.get_plain() + n;
        let wrap_point = next - core.capacity;

        let mut cached = self.cached.get_plain();
        if wrap_point > cached {
            cached = core.await_gating(coordinator, wrap_point);
            self.cached.set_plain(cached);
        }

        debug_assert_bounded_claim!(next, cached, core.capacity);
        self.sequence.set_plain(next);
        next
    }

    pub(super) fn try_next(&self, core: &SequencerCore, n: i64) -> Option<i64> {
        let next = self.sequence.get_plain() + n;
        let wrap_point = next - core.capacity;

        if wrap_point > self.cached.get_plain() {
            let gating = core.gating.get_acquire();
            self.cached.set_plain(gating);
            if wrap_point > gating {
                return None;
            }
        }

        self.sequence.set_plain(next);
        Some(next)
    }

    #[inline]
    pub(super) fn publish(&self, core: &SequencerCore, sequence: i64) {
        debug_assert_monotonic!("cursor", core.cursor.get_plain(), sequence);
        core.cursor.set_release(sequence);
    }

    /// Only `high` is stored: a single producer's range is contiguous by
    /// construction.
    #[inline]
    pub(super) fn publish_range(&self, core: &SequencerCore, _low: i64, high: i64) {
        debug_assert_monotonic!("cursor", core.cursor.get_plain(), high);
        core.cursor.set_release(high);
    }
}
