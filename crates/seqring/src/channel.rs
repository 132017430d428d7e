use crate::config::{Config, ConsumerType, ProducerType};
use crate::error::{Result, RingError};
use crate::handler::{dispatch, EventHandler};
use crate::metrics::MetricsSnapshot;
use crate::poller::PollState;
use crate::ring::{Admission, RingBuffer};
use crate::wait::Coordinator;
use std::fmt;
use std::sync::Arc;

/// Queue of owned values, bundling a ring with the poller and wait
/// strategies picked by a [`Config`].
///
/// Values go in through a [`Producer`] and come out through a [`Consumer`].
/// A single-producer (or single-consumer) channel admits one live handle
/// for that side at a time; a multi side hands out as many as asked, one
/// per thread. Handle methods take `&mut self`, so one handle is never
/// driven by two threads at once. Cloning the channel is cheap and shares
/// the ring.
///
/// ```
/// use seqring::Channel;
///
/// let channel = Channel::spsc(16).unwrap();
/// let mut producer = channel.producer().unwrap();
/// assert!(channel.producer().is_err());
///
/// std::thread::spawn(move || {
///     for i in 0..4 {
///         producer.push(i);
///     }
/// })
/// .join()
/// .unwrap();
///
/// let mut consumer = channel.consumer().unwrap();
/// let mut received = Vec::new();
/// while received.len() < 4 {
///     consumer.receive(16, |v| received.push(v));
/// }
/// assert_eq!(received, vec![0, 1, 2, 3]);
/// ```
///
/// A single-producer handle cannot be cloned:
///
/// ```compile_fail
/// let channel = seqring::Channel::<u64>::spsc(16).unwrap();
/// let producer = channel.producer().unwrap();
/// let _second = producer.clone();
/// ```
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    ring: RingBuffer<T>,
    coordinator: Coordinator,
    config: Config,
    producers: Admission,
    consumers: Admission,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Channel<T> {
    /// Creates a channel with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ring = RingBuffer::new(&config)?;

        tracing::debug!(
            capacity = config.capacity,
            producer = ?config.producer,
            consumer = ?config.consumer,
            "channel created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                ring,
                coordinator: Coordinator::new(config.producer_wait, config.consumer_wait),
                producers: Admission::for_producer(config.producer),
                consumers: Admission::for_consumer(config.consumer),
                config,
            }),
        })
    }

    /// One producer thread, one consumer thread.
    pub fn spsc(capacity: usize) -> Result<Self> {
        Self::with_types(capacity, ProducerType::Single, ConsumerType::Single)
    }

    /// Many producer threads, one consumer thread.
    pub fn mpsc(capacity: usize) -> Result<Self> {
        Self::with_types(capacity, ProducerType::Multi, ConsumerType::Single)
    }

    /// One producer thread, competing consumer threads.
    pub fn spmc(capacity: usize) -> Result<Self> {
        Self::with_types(capacity, ProducerType::Single, ConsumerType::Multi)
    }

    /// Many producer threads, competing consumer threads.
    pub fn mpmc(capacity: usize) -> Result<Self> {
        Self::with_types(capacity, ProducerType::Multi, ConsumerType::Multi)
    }

    fn with_types(capacity: usize, producer: ProducerType, consumer: ConsumerType) -> Result<Self> {
        Self::new(
            Config::default()
                .with_capacity(capacity)
                .with_producer(producer)
                .with_consumer(consumer),
        )
    }

    /// Hands out a producer handle.
    ///
    /// Fails with [`RingError::ProducerTaken`] on a single-producer channel
    /// whose producer is still alive.
    pub fn producer(&self) -> Result<Producer<T>> {
        if !self.inner.producers.acquire() {
            return Err(RingError::ProducerTaken);
        }
        Ok(Producer {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Hands out a consumer handle.
    ///
    /// Fails with [`RingError::ConsumerTaken`] on a single-consumer channel
    /// whose consumer is still alive.
    pub fn consumer(&self) -> Result<Consumer<T>> {
        if !self.inner.consumers.acquire() {
            return Err(RingError::ConsumerTaken);
        }
        Ok(Consumer {
            inner: Arc::clone(&self.inner),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.ring.capacity()
    }

    /// Values pushed but not yet received. On a multi-producer channel this
    /// includes claimed slots still being written.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest sequence claimed by producers.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.inner.ring.sequencer().cursor()
    }

    /// Highest sequence released by consumers.
    #[inline]
    pub fn gating(&self) -> i64 {
        self.inner.ring.sequencer().gating()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.ring.sequencer().metrics()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("config", &self.inner.config)
            .field("len", &self.len())
            .finish()
    }
}

/// Sending side of a [`Channel`].
///
/// Not `Clone`: on a multi-producer channel each thread asks the channel
/// for its own handle.
pub struct Producer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Producer<T> {
    /// Sends `value`, waiting with the producer strategy while the ring is
    /// full.
    #[inline]
    pub fn push(&mut self, value: T) {
        // SAFETY: a single-producer channel admits only this handle, and
        // `&mut self` keeps it on one thread for the call.
        unsafe { self.inner.ring.push(&self.inner.coordinator, value) }
    }

    /// Sends `value` if a slot is free, handing it back otherwise.
    #[inline]
    pub fn try_push(&mut self, value: T) -> std::result::Result<(), T> {
        // SAFETY: as in `push`.
        unsafe { self.inner.ring.try_push(&self.inner.coordinator, value) }
    }

    /// Sends every value with one claim and one publish.
    ///
    /// If the iterator panics the values already sent stay visible and the
    /// rest of the claimed range is delivered as nothing.
    pub fn push_batch<I>(&mut self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        // SAFETY: as in `push`.
        unsafe { self.inner.ring.push_batch(&self.inner.coordinator, values) }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.inner.producers.release();
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("producer", &self.inner.config.producer)
            .finish_non_exhaustive()
    }
}

/// Receiving side of a [`Channel`].
///
/// Not `Clone`: on a multi-consumer channel each thread asks the channel
/// for its own handle, and every value goes to exactly one of them.
pub struct Consumer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Consumer<T> {
    /// Receives up to `batch_size` values without waiting.
    #[inline]
    pub fn receive<F>(&mut self, batch_size: usize, mut f: F) -> PollState
    where
        F: FnMut(T),
    {
        // SAFETY: a single-consumer channel admits only this handle, and
        // `&mut self` keeps it on one thread for the call.
        unsafe { self.inner.ring.drain(batch_size, |value, _| f(value)) }
    }

    /// Receives up to `batch_size` values, waiting with the consumer
    /// strategy until at least one arrives. Returns how many were received.
    pub fn blocking_receive<F>(&mut self, batch_size: usize, mut f: F) -> usize
    where
        F: FnMut(T),
    {
        let mut received = 0;
        loop {
            let state = self.receive(batch_size, |value| {
                received += 1;
                f(value);
            });
            if !state.is_idle() {
                return received;
            }
            self.inner.coordinator.consumer_wait();
        }
    }

    /// Receives up to `batch_size` values through `handler`. A failing
    /// `on_event` is reported to `on_error` and the value is dropped.
    pub fn poll_handler<H>(&mut self, context: &str, batch_size: usize, handler: &mut H) -> PollState
    where
        H: EventHandler<T> + ?Sized,
    {
        let ring = &self.inner.ring;
        let metrics = ring.sequencer().core().metrics();
        // SAFETY: as in `receive`.
        unsafe {
            ring.drain(batch_size, |mut value, sequence| {
                dispatch(&mut *handler, context, &mut value, sequence, metrics);
            })
        }
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.inner.consumers.release();
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("consumer", &self.inner.config.consumer)
            .finish_non_exhaustive()
    }
}
