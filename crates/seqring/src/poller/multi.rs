use super::{GatingRelease, PollState};
use crate::invariants::debug_assert_highest_in_window;
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;

/// Poller shared by competing consumer threads.
///
/// Consumers race to move a shared claim sequence from `current` to
/// `highest` with a CAS; the winner drains that range exclusively. A loser
/// re-reads `current` and recomputes the whole window, because `available`
/// and `highest` were derived from the stale value.
#[derive(Debug)]
pub struct MultiConsumerPoller {
    /// Highest sequence claimed by any consumer.
    sequence: Sequence,
}

impl MultiConsumerPoller {
    /// Creates a poller whose first claim starts after `start`.
    pub fn new(start: i64) -> Self {
        Self {
            sequence: Sequence::new(start),
        }
    }

    /// Highest sequence claimed by any consumer so far.
    pub fn claimed(&self) -> i64 {
        self.sequence.get_acquire()
    }

    pub(super) fn poll<F>(&self, sequencer: &Sequencer, batch: i64, mut drain: F) -> PollState
    where
        F: FnMut(i64),
    {
        let core = sequencer.core();
        let (next, highest) = loop {
            let current = self.sequence.get_acquire();
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

            if self.sequence.weak_compare_and_set(current, highest) {
                break (next, highest);
            }
        };

        let _release = GatingRelease::competing(core, next, highest);
        for sequence in next..=highest {
            drain(sequence);
        }
        PollState::Processing
    }
}
