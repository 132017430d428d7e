//! Slot storage and the queue-mode ring.

use crate::config::{Config, ConsumerType, ProducerType};
use crate::error::{check_capacity, Result};
use crate::poller::{PollState, Poller};
use crate::sequence::PaddedFlag;
use crate::sequencer::Sequencer;
use crate::wait::Coordinator;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr;

// =============================================================================
// SLOT OWNERSHIP
// =============================================================================
//
// Slots carry no synchronization of their own. Access is serialized by the
// sequencer protocol:
//
// - A producer writes slot `s & mask` only between claiming `s` and
//   publishing it. The claim does not return until gating has passed
//   `s - capacity`, so the previous occupant has been fully consumed. The
//   acquire load of gating in the claim pairs with the consumer's release.
// - A consumer touches slot `s & mask` only while `s` lies in the range its
//   poll drained, and that range was found published through an acquire
//   load of the cursor or of the availability flags.
//
// Two threads therefore never hold the same slot at the same time, provided
// a single-producer claim counter and a single-consumer poller are each
// driven by one thread at a time. The public rings guarantee that with
// handles: a single side admits one live handle (`Admission`) and handle
// methods take `&mut self`.
//
// =============================================================================

/// Bytes of unused cells kept on each side of the slot array.
const PAD_BYTES: usize = 128;

/// Fixed array of `capacity` slots addressed by `sequence & mask`, with
/// never-addressed cells on both ends so the first and last slots do not
/// share cache lines with neighbouring allocations.
pub(crate) struct Slots<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: i64,
    pad: usize,
}

// Safety: a slot is only ever accessed by the thread that owns its sequence
// under the claim/publish/gating protocol described above, so sharing the
// array across threads needs no more than `T: Send`.
unsafe impl<T: Send> Send for Slots<T> {}
unsafe impl<T: Send> Sync for Slots<T> {}

impl<T> Slots<T> {
    /// Allocates `capacity` slots, calling `fill` exactly once per slot.
    pub(crate) fn new<F>(capacity: usize, mut fill: F) -> Result<Self>
    where
        F: FnMut() -> T,
    {
        let capacity = check_capacity(capacity)?;
        let pad = PAD_BYTES.div_ceil(mem::size_of::<T>().max(1));

        let mut cells = Vec::with_capacity(capacity + 2 * pad);
        cells.resize_with(pad, || UnsafeCell::new(MaybeUninit::uninit()));
        for _ in 0..capacity {
            cells.push(UnsafeCell::new(MaybeUninit::new(fill())));
        }
        cells.resize_with(capacity + 2 * pad, || UnsafeCell::new(MaybeUninit::uninit()));

        Ok(Self {
            cells: cells.into_boxed_slice(),
            mask: capacity as i64 - 1,
            pad,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    /// Raw pointer to the slot for `sequence`.
    ///
    /// The pointer is always in bounds and initialized; dereferencing it is
    /// only sound for the thread that owns `sequence`.
    #[inline]
    pub(crate) fn get(&self, sequence: i64) -> *mut T {
        let index = self.pad + (sequence & self.mask) as usize;
        self.cells[index].get().cast::<T>()
    }
}

impl<T> Drop for Slots<T> {
    fn drop(&mut self) {
        let capacity = self.capacity();
        for cell in &mut self.cells[self.pad..self.pad + capacity] {
            // SAFETY: every cell in the addressable range was initialized in
            // `new` and is dropped exactly once here.
            unsafe { cell.get_mut().assume_init_drop() };
        }
    }
}

/// Publishes a claimed range when dropped, so a panic between claim and
/// publish cannot leave a permanent hole in the sequence.
pub(crate) struct PublishGuard<'a> {
    sequencer: &'a Sequencer,
    coordinator: &'a Coordinator,
    low: i64,
    high: i64,
}

impl<'a> PublishGuard<'a> {
    #[inline]
    pub(crate) fn new(sequencer: &'a Sequencer, coordinator: &'a Coordinator, low: i64, high: i64) -> Self {
        Self {
            sequencer,
            coordinator,
            low,
            high,
        }
    }
}

impl Drop for PublishGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        if self.low == self.high {
            self.sequencer.publish(self.high);
        } else {
            self.sequencer.publish_range(self.low, self.high);
        }
        self.coordinator.wakeup_consumer();
    }
}

/// Admits handles to one side of a ring.
///
/// A multi side admits any number of handles. A single side admits one at a
/// time; dropping it releases the side, and the release/acquire pair on the
/// flag orders the old holder's claims before the new holder's.
#[derive(Debug)]
pub(crate) struct Admission {
    multi: bool,
    taken: PaddedFlag,
}

impl Admission {
    pub(crate) fn new(multi: bool) -> Self {
        Self {
            multi,
            taken: PaddedFlag::new(false),
        }
    }

    pub(crate) fn for_producer(producer: ProducerType) -> Self {
        Self::new(producer == ProducerType::Multi)
    }

    pub(crate) fn for_consumer(consumer: ConsumerType) -> Self {
        Self::new(consumer == ConsumerType::Multi)
    }

    /// Returns `false` if the side is single and already held.
    #[inline]
    pub(crate) fn acquire(&self) -> bool {
        self.multi || self.taken.compare_and_set(false, true)
    }

    #[inline]
    pub(crate) fn release(&self) {
        if !self.multi {
            self.taken.set_release(false);
        }
    }
}

/// Ring of transient values: producers move a value into a slot, consumers
/// move it out and leave the slot empty.
///
/// The ring owns its poller, so every consumer shares one position. Waiting
/// is delegated to the [`Coordinator`] passed to each call.
/// [`Channel`](crate::Channel) bundles the ring with a coordinator and hands
/// out the handles that uphold the multiplicity contracts below.
pub(crate) struct RingBuffer<T> {
    sequencer: Sequencer,
    poller: Poller,
    slots: Slots<Option<T>>,
}

impl<T> RingBuffer<T> {
    /// Creates an empty ring sized and typed by `config`.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let sequencer = Sequencer::with_metrics(config.capacity, config.producer, config.enable_metrics)?;
        let poller = Poller::new(config.consumer, &sequencer);
        let slots = Slots::new(config.capacity, || None)?;
        Ok(Self {
            sequencer,
            poller,
            slots,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    #[inline]
    pub(crate) fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Number of values published but not yet released by consumers.
    ///
    /// For multi-producer rings this counts claimed slots, some of which may
    /// still be in flight.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        (self.sequencer.cursor() - self.sequencer.gating()).max(0) as usize
    }

    /// Stores `value`, waiting through `coordinator` while the ring is full.
    ///
    /// # Safety
    ///
    /// On a single-producer ring no other thread may push concurrently.
    pub(crate) unsafe fn push(&self, coordinator: &Coordinator, value: T) {
        let sequence = self.sequencer.next_one(coordinator);
        self.store_and_publish(coordinator, sequence, value);
    }

    /// Stores `value` only if a slot is free, handing it back otherwise.
    ///
    /// # Safety
    ///
    /// As for [`push`](Self::push).
    pub(crate) unsafe fn try_push(&self, coordinator: &Coordinator, value: T) -> std::result::Result<(), T> {
        match self.sequencer.try_next_one() {
            Some(sequence) => {
                self.store_and_publish(coordinator, sequence, value);
                Ok(())
            }
            None => Err(value),
        }
    }

    #[inline]
    fn store_and_publish(&self, coordinator: &Coordinator, sequence: i64, value: T) {
        // SAFETY: `sequence` was just claimed by this thread and is not yet
        // published, so no consumer can be reading the slot.
        let stale = unsafe { ptr::replace(self.slots.get(sequence), Some(value)) };
        self.sequencer.publish(sequence);
        coordinator.wakeup_consumer();
        // A slot abandoned by a panicking consumer is dropped after the
        // publish so its destructor cannot stall the ring.
        drop(stale);
    }

    /// Stores every value with one claim and one publish.
    ///
    /// Returns the number of values stored. Fails without waiting if the
    /// batch is larger than the ring. If the iterator panics, the slots it
    /// did not fill are emptied and the whole range is still published.
    ///
    /// # Safety
    ///
    /// As for [`push`](Self::push).
    pub(crate) unsafe fn push_batch<I>(&self, coordinator: &Coordinator, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        let n = values.len();
        if n == 0 {
            return Ok(0);
        }

        let high = self.sequencer.next(coordinator, n)?;
        let low = high - (n as i64 - 1);
        let _publish = PublishGuard::new(&self.sequencer, coordinator, low, high);
        let mut unfilled = Unfilled {
            slots: &self.slots,
            next: low,
            high,
        };

        for value in values.take(n) {
            // SAFETY: the whole range was claimed above and is published only
            // when `_publish` drops.
            let stale = unsafe { ptr::replace(self.slots.get(unfilled.next), Some(value)) };
            unfilled.next += 1;
            drop(stale);
        }
        Ok(n)
    }

    /// Moves up to `batch_size` published values into `f`, in sequence order.
    ///
    /// # Safety
    ///
    /// On a single-consumer ring no other thread may drain concurrently.
    pub(crate) unsafe fn drain<F>(&self, batch_size: usize, mut f: F) -> PollState
    where
        F: FnMut(T, i64),
    {
        self.poller.poll(&self.sequencer, batch_size, |sequence| {
            // SAFETY: the poller hands out each published sequence to exactly
            // one consumer, before releasing it to producers.
            if let Some(value) = unsafe { (*self.slots.get(sequence)).take() } {
                f(value, sequence);
            }
        })
    }
}

/// Empties the claimed slots a batch did not reach, so a panicking iterator
/// cannot republish values left over from an earlier lap.
struct Unfilled<'a, T> {
    slots: &'a Slots<Option<T>>,
    next: i64,
    high: i64,
}

impl<T> Drop for Unfilled<'_, T> {
    fn drop(&mut self) {
        for sequence in self.next..=self.high {
            // SAFETY: the range is still claimed by this thread; `Unfilled`
            // is declared after the publish guard and so drops first.
            drop(unsafe { ptr::replace(self.slots.get(sequence), None) });
        }
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}
