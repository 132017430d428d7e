use super::{GatingRelease, PollState};
use crate::invariants::{debug_assert_highest_in_window, debug_assert_monotonic};
use crate::sequencer::Sequencer;

/// Poller for exactly one consumer thread.
///
/// The consumer owns the gating sequence, so it reads it plain and
/// republishes it with a release store; no CAS is needed.
#[derive(Debug, Default)]
pub struct SingleConsumerPoller {
    _private: (),
}

impl SingleConsumerPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn poll<F>(&self, sequencer: &Sequencer, batch: i64, mut drain: F) -> PollState
    where
        F: FnMut(i64),
    {
        let core = sequencer.core();
        let current = core.gating_plain();
        let next = current + 1;
        let available = core.cursor().min(current + batch);

        if next > available {
            return PollState::Idle;
        }

        let highest = sequencer.highest_published(next, available);
        debug_assert_highest_in_window!(highest, next, available);
        if highest < next {
            return PollState::Idle;
        }
        debug_assert_monotonic!("gating", current, highest);

        let _release = GatingRelease::single(core, next, highest);
        for sequence in next..=highest {
            drain(sequence);
        }
        PollState::Processing
    }
}
