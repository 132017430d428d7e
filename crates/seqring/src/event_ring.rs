//! Ring of pre-allocated events that producers overwrite in place.

use crate::config::Config;
use crate::error::{Result, RingError};
use crate::handler::{dispatch, EventHandler};
use crate::metrics::MetricsSnapshot;
use crate::poller::{PollState, Poller};
use crate::ring::{Admission, PublishGuard, Slots};
use crate::sequencer::Sequencer;
use crate::wait::Coordinator;
use std::fmt;
use std::sync::Arc;

/// Flyweight ring: every slot holds an event created up front by a factory,
/// and publishing means running a translator over the claimed slot.
///
/// Nothing is allocated after construction. The ring is shared through an
/// `Arc`; producers publish through an [`EventProducer`] and consumers read
/// through an [`EventConsumer`], with the same admission rules as
/// [`Channel`](crate::Channel).
///
/// If a translator panics the claimed range is still published, so
/// consumers may observe whatever partial state the translator left
/// behind; the panic then propagates to the producer.
///
/// ```
/// use seqring::{Config, EventRing, ProducerType};
/// use std::sync::Arc;
///
/// let config = Config::default().with_capacity(8).with_producer(ProducerType::Multi);
/// let ring = Arc::new(EventRing::new(config, || 0u64).unwrap());
///
/// ring.producer().unwrap().publish_event_with(21u64, |event, _seq, arg| *event = arg * 2);
///
/// let mut total = 0;
/// ring.consumer().unwrap().poll("example", 8, &mut |event: &mut u64, _seq: i64| -> anyhow::Result<()> {
///     total += *event;
///     Ok(())
/// });
/// assert_eq!(total, 42);
/// ```
pub struct EventRing<E> {
    sequencer: Sequencer,
    slots: Slots<E>,
    poller: Poller,
    coordinator: Coordinator,
    config: Config,
    producers: Admission,
    consumers: Admission,
}

impl<E> EventRing<E> {
    /// Builds the ring, calling `factory` exactly `config.capacity` times.
    pub fn new<F>(config: Config, factory: F) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        config.validate()?;
        let sequencer = Sequencer::with_metrics(config.capacity, config.producer, config.enable_metrics)?;
        let slots = Slots::new(config.capacity, factory)?;

        tracing::debug!(
            capacity = config.capacity,
            producer = ?config.producer,
            consumer = ?config.consumer,
            "event ring created"
        );

        Ok(Self {
            poller: Poller::new(config.consumer, &sequencer),
            sequencer,
            slots,
            coordinator: Coordinator::new(config.producer_wait, config.consumer_wait),
            producers: Admission::for_producer(config.producer),
            consumers: Admission::for_consumer(config.consumer),
            config,
        })
    }

    /// Hands out a producer handle.
    ///
    /// Fails with [`RingError::ProducerTaken`] on a single-producer ring
    /// whose producer is still alive.
    pub fn producer(self: &Arc<Self>) -> Result<EventProducer<E>> {
        if !self.producers.acquire() {
            return Err(RingError::ProducerTaken);
        }
        Ok(EventProducer {
            ring: Arc::clone(self),
        })
    }

    /// Hands out a consumer handle.
    ///
    /// Fails with [`RingError::ConsumerTaken`] on a single-consumer ring
    /// whose consumer is still alive.
    pub fn consumer(self: &Arc<Self>) -> Result<EventConsumer<E>> {
        if !self.consumers.acquire() {
            return Err(RingError::ConsumerTaken);
        }
        Ok(EventConsumer {
            ring: Arc::clone(self),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Highest sequence claimed by producers.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor()
    }

    /// Highest sequence released by consumers.
    #[inline]
    pub fn gating(&self) -> i64 {
        self.sequencer.gating()
    }

    /// Returns `true` once `sequence` has been published.
    pub fn is_published(&self, sequence: i64) -> bool {
        self.sequencer.is_published(sequence)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.sequencer.metrics()
    }
}

impl<E> fmt::Debug for EventRing<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRing")
            .field("config", &self.config)
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

/// Publishing side of an [`EventRing`]. Not `Clone`.
pub struct EventProducer<E> {
    ring: Arc<EventRing<E>>,
}

impl<E> EventProducer<E> {
    #[inline]
    pub fn ring(&self) -> &Arc<EventRing<E>> {
        &self.ring
    }

    /// Claims one slot, fills it with `translator` and publishes it.
    pub fn publish_event<F>(&mut self, translator: F)
    where
        F: FnOnce(&mut E, i64),
    {
        let ring = &*self.ring;
        let sequence = ring.sequencer.next_one(&ring.coordinator);
        let _publish = PublishGuard::new(&ring.sequencer, &ring.coordinator, sequence, sequence);
        // SAFETY: `sequence` is claimed by this handle, which is the only
        // producer of a single-producer ring, and stays unpublished until
        // `_publish` drops.
        translator(unsafe { &mut *ring.slots.get(sequence) }, sequence);
    }

    /// Like [`publish_event`](Self::publish_event), passing `arg` through to
    /// the translator so it needs no captures.
    pub fn publish_event_with<A, F>(&mut self, arg: A, translator: F)
    where
        F: FnOnce(&mut E, i64, A),
    {
        let ring = &*self.ring;
        let sequence = ring.sequencer.next_one(&ring.coordinator);
        let _publish = PublishGuard::new(&ring.sequencer, &ring.coordinator, sequence, sequence);
        // SAFETY: as in `publish_event`.
        translator(unsafe { &mut *ring.slots.get(sequence) }, sequence, arg);
    }

    /// Claims one slot per argument with a single claim, runs `translator`
    /// over each and publishes the whole range at once.
    ///
    /// Returns the number of events published. Fails without waiting if
    /// there are more arguments than slots.
    pub fn publish_events<I, F>(&mut self, args: I, mut translator: F) -> Result<usize>
    where
        I: IntoIterator,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(&mut E, i64, I::Item),
    {
        let args = args.into_iter();
        let n = args.len();
        if n == 0 {
            return Ok(0);
        }

        let ring = &*self.ring;
        let high = ring.sequencer.next(&ring.coordinator, n)?;
        let low = high - (n as i64 - 1);
        let _publish = PublishGuard::new(&ring.sequencer, &ring.coordinator, low, high);

        for (sequence, arg) in (low..=high).zip(args) {
            // SAFETY: the range `low..=high` is claimed by this handle and
            // unpublished until `_publish` drops.
            translator(unsafe { &mut *ring.slots.get(sequence) }, sequence, arg);
        }
        Ok(n)
    }
}

impl<E> Drop for EventProducer<E> {
    fn drop(&mut self) {
        self.ring.producers.release();
    }
}

impl<E> fmt::Debug for EventProducer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventProducer").finish_non_exhaustive()
    }
}

/// Consuming side of an [`EventRing`]. Not `Clone`.
pub struct EventConsumer<E> {
    ring: Arc<EventRing<E>>,
}

impl<E> EventConsumer<E> {
    #[inline]
    pub fn ring(&self) -> &Arc<EventRing<E>> {
        &self.ring
    }

    /// Hands up to `batch_size` published events to `handler`, in sequence
    /// order. Events stay in their slots for the next lap.
    pub fn poll<H>(&mut self, context: &str, batch_size: usize, handler: &mut H) -> PollState
    where
        H: EventHandler<E> + ?Sized,
    {
        let ring = &*self.ring;
        let metrics = ring.sequencer.core().metrics();
        ring.poller.poll(&ring.sequencer, batch_size, |sequence| {
            // SAFETY: the poller gives this handle exclusive use of
            // `sequence` until it releases the drained range; a
            // single-consumer ring has no other consumer handle.
            let event = unsafe { &mut *ring.slots.get(sequence) };
            dispatch(&mut *handler, context, event, sequence, metrics);
        })
    }

    /// Polls until at least one event was handled, waiting with the
    /// consumer strategy in between.
    pub fn blocking_poll<H>(&mut self, context: &str, batch_size: usize, handler: &mut H)
    where
        H: EventHandler<E> + ?Sized,
    {
        while self.poll(context, batch_size, handler).is_idle() {
            self.ring.coordinator.consumer_wait();
        }
    }
}

impl<E> Drop for EventConsumer<E> {
    fn drop(&mut self) {
        self.ring.consumers.release();
    }
}

impl<E> fmt::Debug for EventConsumer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventConsumer").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::config::{ConsumerType, ProducerType};
    use crate::handler::HandlerError;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Trade {
        id: u64,
        price: f64,
    }

    #[derive(Default)]
    struct Collect {
        ids: Vec<u64>,
    }

    impl EventHandler<Trade> for Collect {
        fn on_event(&mut self, _context: &str, event: &mut Trade, _sequence: i64) -> anyhow::Result<()> {
            self.ids.push(event.id);
            Ok(())
        }
    }

    fn config(capacity: usize) -> Config {
        Config::default().with_capacity(capacity)
    }

    fn trade_ring(config: Config) -> Arc<EventRing<Trade>> {
        Arc::new(EventRing::new(config, Trade::default).unwrap())
    }

    #[test]
    fn test_factory_called_once_per_slot() {
        let mut calls = 0;
        let ring = EventRing::new(config(32), || {
            calls += 1;
            Trade::default()
        })
        .unwrap();
        assert_eq!(calls, 32);
        assert_eq!(ring.capacity(), 32);
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(EventRing::new(config(12), Trade::default).is_err());
    }

    #[test]
    fn test_handle_admission() {
        let ring = trade_ring(config(8));
        let producer = ring.producer().unwrap();
        let consumer = ring.consumer().unwrap();
        assert_eq!(ring.producer().unwrap_err(), RingError::ProducerTaken);
        assert_eq!(ring.consumer().unwrap_err(), RingError::ConsumerTaken);
        drop((producer, consumer));
        assert!(ring.producer().is_ok());

        let shared = trade_ring(config(8).with_producer(ProducerType::Multi).with_consumer(ConsumerType::Multi));
        let _producers = [shared.producer().unwrap(), shared.producer().unwrap()];
        let _consumers = [shared.consumer().unwrap(), shared.consumer().unwrap()];
    }

    #[test]
    fn test_publish_variants() {
        let ring = trade_ring(config(8));
        let mut producer = ring.producer().unwrap();

        producer.publish_event(|trade, seq| trade.id = seq as u64 + 100);
        producer.publish_event_with(7.5, |trade, seq, price| {
            trade.id = seq as u64 + 100;
            trade.price = price;
        });
        let published = producer
            .publish_events([1.0, 2.0, 3.0], |trade, seq, price| {
                trade.id = seq as u64 + 100;
                trade.price = price;
            })
            .unwrap();
        assert_eq!(published, 3);

        let mut consumer = ring.consumer().unwrap();
        let mut handler = Collect::default();
        assert_eq!(consumer.poll("test", 8, &mut handler), PollState::Processing);
        assert_eq!(handler.ids, vec![100, 101, 102, 103, 104]);
        assert_eq!(consumer.poll("test", 8, &mut handler), PollState::Idle);
    }

    #[test]
    fn test_publish_events_rejects_oversized_batch() {
        let ring = trade_ring(config(4));
        let err = ring
            .producer()
            .unwrap()
            .publish_events(0..5u32, |trade, _, id| trade.id = u64::from(id))
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(ring.cursor(), -1);
    }

    #[test]
    fn test_events_are_reused_across_laps() {
        let ring = trade_ring(config(2));
        let mut producer = ring.producer().unwrap();
        let mut consumer = ring.consumer().unwrap();
        let mut handler = Collect::default();

        for id in 0..6 {
            producer.publish_event_with(id, |trade, _, id| trade.id = id);
            consumer.blocking_poll("test", 1, &mut handler);
        }
        assert_eq!(handler.ids, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_translator_still_publishes() {
        let ring = trade_ring(config(4).with_producer(ProducerType::Multi));
        let mut producer = ring.producer().unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            producer.publish_event(|trade, _| {
                trade.id = 1;
                panic!("translator failed");
            });
        }));
        assert!(result.is_err());
        assert!(ring.is_published(0));

        producer.publish_event(|trade, _| trade.id = 2);
        let mut handler = Collect::default();
        ring.consumer().unwrap().poll("test", 4, &mut handler);
        // The partially written event is still delivered.
        assert_eq!(handler.ids, vec![1, 2]);
    }

    #[test]
    fn test_failing_handler_is_reported_and_skipped() {
        struct FailOnTwo {
            errors: Vec<i64>,
            ok: Vec<i64>,
        }

        impl EventHandler<Trade> for FailOnTwo {
            fn on_event(&mut self, _context: &str, _event: &mut Trade, sequence: i64) -> anyhow::Result<()> {
                anyhow::ensure!(sequence != 2, "bad trade");
                self.ok.push(sequence);
                Ok(())
            }

            fn on_error(&mut self, context: &str, _event: &mut Trade, sequence: i64, _error: &HandlerError) {
                assert_eq!(context, "trades");
                self.errors.push(sequence);
            }
        }

        let ring = trade_ring(config(8).with_consumer(ConsumerType::Multi).with_metrics(true));
        ring.producer()
            .unwrap()
            .publish_events(0..5u32, |trade, _, id| trade.id = u64::from(id))
            .unwrap();

        let mut handler = FailOnTwo {
            errors: Vec::new(),
            ok: Vec::new(),
        };
        ring.consumer().unwrap().poll("trades", 8, &mut handler);

        assert_eq!(handler.errors, vec![2]);
        assert_eq!(handler.ok, vec![0, 1, 3, 4]);
        assert_eq!(ring.gating(), 4);
        assert_eq!(ring.metrics().handler_errors, 1);
    }
}
