//! Consumer-side draining of published sequences.
//!
//! A poll finds the contiguous range of published sequences after the
//! consumer's position (bounded by a batch limit), hands each sequence to a
//! `drain` callback, then releases the range back to producers through the
//! gating sequence. Slot access is left to the caller, so the same pollers
//! serve the queue ring and the flyweight event ring.

mod multi;
mod single;

pub use multi::MultiConsumerPoller;
pub use single::SingleConsumerPoller;

use crate::config::ConsumerType;
use crate::sequencer::{Sequencer, SequencerCore};

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// At least one sequence was drained.
    Processing,
    /// Nothing was published past the consumer's position.
    Idle,
}

impl PollState {
    #[inline]
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

/// Single or competing-consumer poller.
#[derive(Debug)]
pub enum Poller {
    Single(SingleConsumerPoller),
    Multi(MultiConsumerPoller),
}

impl Poller {
    /// Creates a poller for `sequencer`, starting at its current gating
    /// sequence. Rings build their own; a standalone poller must only ever be
    /// used with the sequencer it was created for.
    pub fn new(consumer: ConsumerType, sequencer: &Sequencer) -> Self {
        match consumer {
            ConsumerType::Single => Self::Single(SingleConsumerPoller::new()),
            ConsumerType::Multi => Self::Multi(MultiConsumerPoller::new(sequencer.gating())),
        }
    }

    pub fn consumer_type(&self) -> ConsumerType {
        match self {
            Self::Single(_) => ConsumerType::Single,
            Self::Multi(_) => ConsumerType::Multi,
        }
    }

    /// Drains up to `batch_size` published sequences, calling `drain` for
    /// each in increasing order. A batch size of zero drains nothing; one
    /// larger than the ring drains at most one lap.
    #[inline]
    pub fn poll<F>(&self, sequencer: &Sequencer, batch_size: usize, drain: F) -> PollState
    where
        F: FnMut(i64),
    {
        if batch_size == 0 {
            return PollState::Idle;
        }
        let batch = batch_size.min(sequencer.capacity()) as i64;
        let state = match self {
            Self::Single(poller) => poller.poll(sequencer, batch, drain),
            Self::Multi(poller) => poller.poll(sequencer, batch, drain),
        };
        if state.is_idle() {
            if let Some(metrics) = sequencer.core().metrics() {
                metrics.add_idle_poll();
            }
        }
        state
    }
}

/// Releases a drained range to producers when dropped, so a panicking drain
/// callback cannot stall the ring.
struct GatingRelease<'a> {
    core: &'a SequencerCore,
    /// First sequence of the range.
    next: i64,
    /// Last sequence of the range.
    highest: i64,
    /// Competing consumers hand off from the sequence before the range.
    observed: Option<i64>,
}

impl<'a> GatingRelease<'a> {
    fn single(core: &'a SequencerCore, next: i64, highest: i64) -> Self {
        Self {
            core,
            next,
            highest,
            observed: None,
        }
    }

    fn competing(core: &'a SequencerCore, next: i64, highest: i64) -> Self {
        Self {
            core,
            next,
            highest,
            observed: Some(next - 1),
        }
    }
}

impl Drop for GatingRelease<'_> {
    fn drop(&mut self) {
        match self.observed {
            None => self.core.publish_gating(self.highest),
            Some(observed) => self.core.advance_gating(self.highest, observed),
        }
        if let Some(metrics) = self.core.metrics() {
            metrics.add_batch_consumed((self.highest - self.next + 1) as u64);
        }
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::config::ProducerType;
    use crate::wait::Coordinator;

    fn publish(sequencer: &Sequencer, n: usize) {
        let coordinator = Coordinator::default();
        let high = sequencer.next(&coordinator, n).unwrap();
        sequencer.publish_range(high - (n as i64 - 1), high);
    }

    #[test]
    fn test_idle_poll_has_no_side_effects() {
        for consumer in [ConsumerType::Single, ConsumerType::Multi] {
            let sequencer = Sequencer::new(8, ProducerType::Single).unwrap();
            let poller = Poller::new(consumer, &sequencer);
            for _ in 0..3 {
                assert_eq!(poller.poll(&sequencer, 4, |_| panic!("nothing to drain")), PollState::Idle);
                assert_eq!(sequencer.gating(), -1);
            }
        }
    }

    #[test]
    fn test_batch_limit_splits_drain() {
        for consumer in [ConsumerType::Single, ConsumerType::Multi] {
            let sequencer = Sequencer::new(8, ProducerType::Single).unwrap();
            let poller = Poller::new(consumer, &sequencer);
            publish(&sequencer, 8);

            let mut seen = Vec::new();
            assert_eq!(poller.poll(&sequencer, 4, |s| seen.push(s)), PollState::Processing);
            assert_eq!(seen, vec![0, 1, 2, 3]);
            assert_eq!(sequencer.gating(), 3);

            assert_eq!(poller.poll(&sequencer, 4, |s| seen.push(s)), PollState::Processing);
            assert_eq!(seen, (0..8).collect::<Vec<_>>());
            assert_eq!(sequencer.gating(), 7);

            assert_eq!(poller.poll(&sequencer, 4, |s| seen.push(s)), PollState::Idle);
        }
    }

    #[test]
    fn test_zero_batch_is_idle() {
        let sequencer = Sequencer::new(8, ProducerType::Single).unwrap();
        publish(&sequencer, 2);
        let poller = Poller::new(ConsumerType::Single, &sequencer);
        assert_eq!(poller.poll(&sequencer, 0, |_| {}), PollState::Idle);
        assert_eq!(sequencer.gating(), -1);
    }

    #[test]
    fn test_gap_in_multi_producer_publication_is_not_drained() {
        for consumer in [ConsumerType::Single, ConsumerType::Multi] {
            let coordinator = Coordinator::default();
            let sequencer = Sequencer::new(8, ProducerType::Multi).unwrap();
            let poller = Poller::new(consumer, &sequencer);

            let first = sequencer.next(&coordinator, 1).unwrap();
            let second = sequencer.next(&coordinator, 1).unwrap();
            sequencer.publish(second);

            assert_eq!(poller.poll(&sequencer, 8, |_| panic!("gap drained")), PollState::Idle);

            sequencer.publish(first);
            let mut seen = Vec::new();
            assert_eq!(poller.poll(&sequencer, 8, |s| seen.push(s)), PollState::Processing);
            assert_eq!(seen, vec![0, 1]);
        }
    }

    #[test]
    fn test_panicking_drain_still_releases_range() {
        for consumer in [ConsumerType::Single, ConsumerType::Multi] {
            let sequencer = Sequencer::new(8, ProducerType::Single).unwrap();
            let poller = Poller::new(consumer, &sequencer);
            publish(&sequencer, 4);

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                poller.poll(&sequencer, 8, |s| assert_ne!(s, 1));
            }));
            assert!(result.is_err());
            assert_eq!(sequencer.gating(), 3);
        }
    }

    #[test]
    fn test_oversized_batch_is_clamped_to_one_lap() {
        for consumer in [ConsumerType::Single, ConsumerType::Multi] {
            let sequencer = Sequencer::new(8, ProducerType::Single).unwrap();
            let poller = Poller::new(consumer, &sequencer);
            publish(&sequencer, 4);

            let mut seen = Vec::new();
            assert_eq!(
                poller.poll(&sequencer, usize::MAX, |s| seen.push(s)),
                PollState::Processing
            );
            assert_eq!(seen, vec![0, 1, 2, 3]);

            publish(&sequencer, 8);
            assert_eq!(
                poller.poll(&sequencer, usize::MAX - 1, |s| seen.push(s)),
                PollState::Processing
            );
            assert_eq!(seen, (0..12).collect::<Vec<_>>());
            assert_eq!(sequencer.gating(), 11);
        }
    }

    #[test]
    fn test_competing_poller_created_late_starts_at_gating() {
        let sequencer = Sequencer::new(4, ProducerType::Single).unwrap();
        publish(&sequencer, 4);
        let first = Poller::new(ConsumerType::Multi, &sequencer);
        assert_eq!(first.poll(&sequencer, 4, |_| {}), PollState::Processing);
        publish(&sequencer, 4);

        let late = Poller::new(ConsumerType::Multi, &sequencer);
        let mut seen = Vec::new();
        assert_eq!(late.poll(&sequencer, 4, |s| seen.push(s)), PollState::Processing);
        assert_eq!(seen, vec![4, 5, 6, 7]);
        assert_eq!(sequencer.gating(), 7);
    }
}
