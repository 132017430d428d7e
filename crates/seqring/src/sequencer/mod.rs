//! Sequence claiming and publication.
//!
//! A [`Sequencer`] is one concrete state struct ([`SequencerCore`]: capacity,
//! cursor, gating) plus one of two claim strategies:
//!
//! - `SingleProducer`: a private claim counter; publication is a release
//!   store of the cursor.
//! - `MultiProducer`: fetch-and-add on the cursor; publication marks
//!   per-slot lap flags in an [`AvailabilityBuffer`](crate::AvailabilityBuffer).
//!
//! The shared part (waiting on the gating sequence when the ring is full, and
//! advancing it after consumption) lives on [`SequencerCore`].

mod multi;
mod single;

use multi::MultiProducer;
use single::SingleProducer;

use crate::config::ProducerType;
use crate::error::{check_capacity, check_claim, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::sequence::Sequence;
use crate::sync::Snooze;
use crate::wait::Coordinator;
use std::fmt;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// **Producer (claim → write → publish):**
// 1. Claim: SP reads its private counter (plain); MP does `get_and_add` on
//    the cursor so concurrent producers get disjoint ranges
// 2. If the claim would lap the consumers (`next - capacity > cached`), load
//    gating with Acquire until it reaches the wrap point; the Acquire pairs
//    with the consumer's Release so its slot reads happen-before our writes
// 3. Write slot(s) (no ordering, protected by the claim)
// 4. Publish: SP stores the cursor with Release; MP stores lap flags with
//    Release (or one Release fence for a range)
//
// **Consumer (observe → drain → release):**
// 1. Load cursor with Acquire (upper bound of what may be published)
// 2. MP only: scan lap flags for the contiguous published prefix
// 3. Read slot(s)
// 4. Store gating with Release (single consumer) or CAS it forward in claim
//    order (competing consumers)
//
// Invariant: `cursor - gating ≤ capacity`, so a producer never writes a slot
// a consumer may still read.
//
// =============================================================================

/// State shared by both claim strategies.
pub struct SequencerCore {
    capacity: i64,
    /// Highest claimed (MP) or published (SP) sequence.
    cursor: Sequence,
    /// Highest sequence fully consumed.
    gating: Sequence,
    metrics: Metrics,
    enable_metrics: bool,
}

impl SequencerCore {
    fn new(capacity: usize, enable_metrics: bool) -> Self {
        Self {
            capacity: capacity as i64,
            cursor: Sequence::default(),
            gating: Sequence::default(),
            metrics: Metrics::new(),
            enable_metrics,
        }
    }

    /// Ring capacity as a sequence delta.
    #[inline]
    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    /// Cursor sequence with acquire ordering.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.cursor.get_acquire()
    }

    /// Gating sequence without ordering. Only the single consumer may rely
    /// on this value.
    #[inline]
    pub fn gating_plain(&self) -> i64 {
        self.gating.get_plain()
    }

    /// Gating sequence with acquire ordering.
    #[inline]
    pub fn gating(&self) -> i64 {
        self.gating.get_acquire()
    }

    /// Single-consumer release of everything up to `sequence`.
    #[inline]
    pub fn publish_gating(&self, sequence: i64) {
        self.gating.set_release(sequence);
    }

    /// Moves gating from `observed` to `target` once every range claimed
    /// before `observed + 1` has been released.
    ///
    /// Competing consumers claim contiguous ranges in order but may finish
    /// in any order. The CAS only succeeds while gating still equals
    /// `observed`, i.e. after the predecessor range was handed off, so gating
    /// never regresses and never skips over a range still being drained.
    pub fn advance_gating(&self, target: i64, observed: i64) {
        if target <= observed {
            return;
        }
        let snooze = Snooze::new();
        while !self.gating.weak_compare_and_set(observed, target) {
            snooze.snooze();
        }
    }

    /// Waits until consumers have released `wrap_point`, returning the
    /// gating value that satisfied the wait.
    pub fn await_gating(&self, coordinator: &Coordinator, wrap_point: i64) -> i64 {
        let mut gating = self.gating.get_acquire();
        if gating >= wrap_point {
            return gating;
        }

        tracing::trace!(wrap_point, gating, "ring full, producer waiting");
        while gating < wrap_point {
            if self.enable_metrics {
                self.metrics.add_producer_wait();
            }
            coordinator.producer_wait();
            gating = self.gating.get_acquire();
        }
        gating
    }

    #[inline]
    pub(crate) fn metrics(&self) -> Option<&Metrics> {
        self.enable_metrics.then_some(&self.metrics)
    }
}

/// The claim strategy of a [`Sequencer`].
enum Claim {
    Single(SingleProducer),
    Multi(MultiProducer),
}

/// Producer cursor, consumer gating sequence and the claim/publish protocol
/// between them.
pub struct Sequencer {
    core: SequencerCore,
    claim: Claim,
}

impl Sequencer {
    /// Creates a sequencer for a ring of `capacity` slots.
    pub fn new(capacity: usize, producer: ProducerType) -> Result<Self> {
        Self::with_metrics(capacity, producer, false)
    }

    /// Creates a sequencer, optionally collecting [`Metrics`].
    pub fn with_metrics(capacity: usize, producer: ProducerType, enable_metrics: bool) -> Result<Self> {
        let capacity = check_capacity(capacity)?;
        let claim = match producer {
            ProducerType::Single => Claim::Single(SingleProducer::new()),
            ProducerType::Multi => Claim::Multi(MultiProducer::new(capacity)?),
        };
        Ok(Self {
            core: SequencerCore::new(capacity, enable_metrics),
            claim,
        })
    }

    /// Shared cursor/gating state.
    #[inline]
    pub fn core(&self) -> &SequencerCore {
        &self.core
    }

    /// Number of slots this sequencer coordinates.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity as usize
    }

    /// Producer multiplicity this sequencer was built for.
    pub fn producer_type(&self) -> ProducerType {
        match self.claim {
            Claim::Single(_) => ProducerType::Single,
            Claim::Multi(_) => ProducerType::Multi,
        }
    }

    /// Claims `n` sequences, waiting through `coordinator` while the ring is
    /// full. Returns the highest claimed sequence; the range is
    /// `high - (n - 1)..=high`.
    ///
    /// `n` must be in `1..=capacity`; anything else fails immediately.
    #[inline]
    pub fn next(&self, coordinator: &Coordinator, n: usize) -> Result<i64> {
        check_claim(n, self.capacity())?;
        let n = n as i64;
        Ok(match &self.claim {
            Claim::Single(single) => single.next(&self.core, coordinator, n),
            Claim::Multi(multi) => multi.next(&self.core, coordinator, n),
        })
    }

    /// Claims `n` sequences only if that needs no wait. `Ok(None)` means the
    /// ring is currently too full.
    pub fn try_next(&self, n: usize) -> Result<Option<i64>> {
        check_claim(n, self.capacity())?;
        let n = n as i64;
        Ok(match &self.claim {
            Claim::Single(single) => single.try_next(&self.core, n),
            Claim::Multi(multi) => multi.try_next(&self.core, n),
        })
    }

    /// Claims one sequence. A single slot always fits, so this cannot fail.
    #[inline]
    pub fn next_one(&self, coordinator: &Coordinator) -> i64 {
        match &self.claim {
            Claim::Single(single) => single.next(&self.core, coordinator, 1),
            Claim::Multi(multi) => multi.next(&self.core, coordinator, 1),
        }
    }

    /// Claims one sequence if a slot is free right now.
    #[inline]
    pub fn try_next_one(&self) -> Option<i64> {
        match &self.claim {
            Claim::Single(single) => single.try_next(&self.core, 1),
            Claim::Multi(multi) => multi.try_next(&self.core, 1),
        }
    }

    /// Publishes one claimed sequence.
    #[inline]
    pub fn publish(&self, sequence: i64) {
        match &self.claim {
            Claim::Single(single) => single.publish(&self.core, sequence),
            Claim::Multi(multi) => multi.publish(sequence),
        }
        if let Some(metrics) = self.core.metrics() {
            metrics.add_items_published(1);
        }
    }

    /// Publishes a claimed range `low..=high` with one synchronization.
    #[inline]
    pub fn publish_range(&self, low: i64, high: i64) {
        match &self.claim {
            Claim::Single(single) => single.publish_range(&self.core, low, high),
            Claim::Multi(multi) => multi.publish_range(low, high),
        }
        if let Some(metrics) = self.core.metrics() {
            metrics.add_items_published((high - low + 1) as u64);
        }
    }

    /// Highest sequence in `next..=available` that consumers may read, given
    /// `available` was taken from the cursor. `next - 1` if none.
    #[inline]
    pub fn highest_published(&self, next: i64, available: i64) -> i64 {
        match &self.claim {
            Claim::Single(_) => available,
            Claim::Multi(multi) => multi.highest_published(next, available),
        }
    }

    /// Returns `true` once `sequence` has been published.
    pub fn is_published(&self, sequence: i64) -> bool {
        match &self.claim {
            Claim::Single(_) => sequence <= self.core.cursor(),
            Claim::Multi(multi) => multi.is_published(sequence),
        }
    }

    /// Cursor with acquire ordering.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.core.cursor()
    }

    /// Gating sequence with acquire ordering.
    #[inline]
    pub fn gating(&self) -> i64 {
        self.core.gating()
    }

    /// See [`SequencerCore::advance_gating`].
    #[inline]
    pub fn advance_gating(&self, target: i64, observed: i64) {
        self.core.advance_gating(target, observed);
    }

    /// See [`SequencerCore::publish_gating`].
    #[inline]
    pub fn publish_gating(&self, sequence: i64) {
        self.core.publish_gating(sequence);
    }

    /// Metrics snapshot; all zeros when metrics are disabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.core
            .metrics()
            .map(Metrics::snapshot)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("producer", &self.producer_type())
            .field("capacity", &self.core.capacity)
            .field("cursor", &self.core.cursor)
            .field("gating", &self.core.gating)
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::error::RingError;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn both(capacity: usize) -> [Sequencer; 2] {
        [
            Sequencer::new(capacity, ProducerType::Single).unwrap(),
            Sequencer::new(capacity, ProducerType::Multi).unwrap(),
        ]
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert_eq!(
            Sequencer::new(12, ProducerType::Single).unwrap_err(),
            RingError::NotPowerOfTwo { capacity: 12 }
        );
        assert!(Sequencer::new(0, ProducerType::Multi).is_err());
    }

    #[test]
    fn test_claim_size_is_validated() {
        let coordinator = Coordinator::default();
        for sequencer in both(8) {
            assert_eq!(
                sequencer.next(&coordinator, 9),
                Err(RingError::InvalidClaim {
                    requested: 9,
                    capacity: 8
                })
            );
            assert!(sequencer.next(&coordinator, 0).is_err());
            assert!(sequencer.try_next(9).is_err());
        }
    }

    #[test]
    fn test_claims_are_contiguous() {
        let coordinator = Coordinator::default();
        for sequencer in both(8) {
            assert_eq!(sequencer.next(&coordinator, 1), Ok(0));
            assert_eq!(sequencer.next(&coordinator, 3), Ok(3));
            assert_eq!(sequencer.next(&coordinator, 4), Ok(7));
            // Full: cursor - gating == capacity.
            assert_eq!(sequencer.try_next(1), Ok(None));
        }
    }

    #[test]
    fn test_single_producer_publication() {
        let coordinator = Coordinator::default();
        let sequencer = Sequencer::new(8, ProducerType::Single).unwrap();

        let high = sequencer.next(&coordinator, 4).unwrap();
        assert_eq!(sequencer.cursor(), -1);
        sequencer.publish_range(high - 3, high);
        assert_eq!(sequencer.cursor(), 3);
        assert_eq!(sequencer.highest_published(0, 3), 3);
        assert!(sequencer.is_published(3));
        assert!(!sequencer.is_published(4));
    }

    #[test]
    fn test_multi_producer_out_of_order_publication() {
        let coordinator = Coordinator::default();
        let sequencer = Sequencer::new(8, ProducerType::Multi).unwrap();

        let a = sequencer.next(&coordinator, 1).unwrap();
        let b = sequencer.next(&coordinator, 1).unwrap();
        // The cursor reflects claims, not publication.
        assert_eq!(sequencer.cursor(), 1);

        sequencer.publish(b);
        assert_eq!(sequencer.highest_published(0, 1), -1);
        sequencer.publish(a);
        assert_eq!(sequencer.highest_published(0, 1), 1);
    }

    #[test]
    fn test_advance_gating_is_monotonic() {
        let sequencer = Sequencer::new(8, ProducerType::Multi).unwrap();
        sequencer.advance_gating(3, -1);
        assert_eq!(sequencer.gating(), 3);
        // Stale target never moves gating backwards.
        sequencer.advance_gating(2, 3);
        assert_eq!(sequencer.gating(), 3);
    }

    #[test]
    fn test_advance_gating_waits_for_predecessor() {
        let sequencer = Arc::new(Sequencer::new(16, ProducerType::Multi).unwrap());

        // Range 4..=7 finishes before range 0..=3.
        let later = {
            let sequencer = Arc::clone(&sequencer);
            thread::spawn(move || sequencer.advance_gating(7, 3))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sequencer.gating(), -1);

        sequencer.advance_gating(3, -1);
        later.join().unwrap();
        assert_eq!(sequencer.gating(), 7);
    }

    #[test]
    fn test_producer_waits_for_gating() {
        let coordinator = Arc::new(Coordinator::default());
        for sequencer in both(4) {
            let sequencer = Arc::new(sequencer);
            let high = sequencer.next(&coordinator, 4).unwrap();
            sequencer.publish_range(0, high);

            let producer = {
                let sequencer = Arc::clone(&sequencer);
                let coordinator = Arc::clone(&coordinator);
                thread::spawn(move || sequencer.next(&coordinator, 2).unwrap())
            };

            thread::sleep(Duration::from_millis(20));
            assert!(!producer.is_finished());

            sequencer.publish_gating(1);
            assert_eq!(producer.join().unwrap(), 5);
        }
    }

    #[test]
    fn test_metrics_count_publication() {
        let coordinator = Coordinator::default();
        let sequencer = Sequencer::with_metrics(8, ProducerType::Single, true).unwrap();
        let high = sequencer.next(&coordinator, 3).unwrap();
        sequencer.publish_range(high - 2, high);
        assert_eq!(sequencer.metrics().items_published, 3);

        let quiet = Sequencer::new(8, ProducerType::Single).unwrap();
        let high = quiet.next(&coordinator, 3).unwrap();
        quiet.publish_range(high - 2, high);
        assert_eq!(quiet.metrics(), MetricsSnapshot::default());
    }
}
