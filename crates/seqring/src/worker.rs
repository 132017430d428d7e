//! Dedicated consumer threads.
//!
//! A [`Worker`] owns one OS thread that polls an [`EventRing`] and feeds an
//! [`EventHandler`] until it is shut down. Shutdown is cooperative: the
//! running flag is checked between polls, so a batch that has started is
//! always finished.

use crate::config::{BatchSizeLimit, Config};
use crate::error::{RingError, Result};
use crate::event_ring::{EventConsumer, EventRing};
use crate::handler::EventHandler;
use crate::sequence::PaddedFlag;
use crate::wait::ConsumerWaitStrategy;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Consumer thread draining one [`EventRing`].
///
/// The worker takes a consumer handle when it is created, so a
/// single-consumer ring can have only one worker. The handle travels to the
/// thread on [`start`](Self::start) and comes back on
/// [`shutdown`](Self::shutdown), after which the worker can be started
/// again.
pub struct Worker<E> {
    name: String,
    ring: Arc<EventRing<E>>,
    consumer: Option<EventConsumer<E>>,
    batch_size: usize,
    running: Arc<PaddedFlag>,
    handle: Option<JoinHandle<EventConsumer<E>>>,
}

impl<E: Send + 'static> Worker<E> {
    /// Creates a stopped worker. `name` becomes the thread name and the
    /// handler context.
    ///
    /// Fails with [`RingError::ConsumerTaken`] if `ring` is single-consumer
    /// and already has a consumer.
    pub fn new(name: impl Into<String>, ring: Arc<EventRing<E>>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(RingError::InvalidBatchSize { batch_size });
        }
        let consumer = ring.consumer()?;
        Ok(Self {
            name: name.into(),
            ring,
            consumer: Some(consumer),
            batch_size,
            running: Arc::new(PaddedFlag::new(false)),
            handle: None,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ring producers publish into.
    #[inline]
    pub fn ring(&self) -> &Arc<EventRing<E>> {
        &self.ring
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.get_acquire()
    }

    /// Spawns the consumer thread. `handler.on_start` runs on that thread
    /// before the first poll.
    pub fn start<H>(&mut self, handler: H) -> Result<()>
    where
        H: EventHandler<E> + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(RingError::WorkerAlreadyStarted);
        }
        let Some(consumer) = self.consumer.take() else {
            return Err(RingError::ConsumerTaken);
        };
        self.running.set_release(true);

        let name = self.name.clone();
        let running = Arc::clone(&self.running);
        let batch_size = self.batch_size;

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run(&name, consumer, &running, batch_size, handler));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.set_release(false);
                // The handle went down with the closure; take the side back.
                self.consumer = self.ring.consumer().ok();
                Err(RingError::WorkerSpawn(e.to_string()))
            }
        }
    }

    /// Stops the consumer thread and waits for it to exit. Does nothing if
    /// the worker was never started.
    ///
    /// Returns the panic payload if the handler panicked.
    pub fn shutdown(&mut self) -> thread::Result<()> {
        match self.stop() {
            None => Ok(()),
            Some(Ok(consumer)) => {
                self.consumer = Some(consumer);
                Ok(())
            }
            Some(Err(panic)) => {
                // The handle was dropped while unwinding.
                self.consumer = self.ring.consumer().ok();
                Err(panic)
            }
        }
    }
}

impl<E> Worker<E> {
    fn stop(&mut self) -> Option<thread::Result<EventConsumer<E>>> {
        self.running.set_release(false);
        let handle = self.handle.take()?;
        let coordinator = self.ring.coordinator();
        if coordinator.consumer_strategy() == ConsumerWaitStrategy::Blocking {
            // One signal can be swallowed by another consumer of the same
            // ring, so keep signalling until this thread is out.
            while !handle.is_finished() {
                coordinator.wakeup_consumer();
                thread::yield_now();
            }
        }
        Some(handle.join())
    }
}

fn run<E, H>(
    name: &str,
    mut consumer: EventConsumer<E>,
    running: &PaddedFlag,
    batch_size: usize,
    mut handler: H,
) -> EventConsumer<E>
where
    H: EventHandler<E>,
{
    handler.on_start(name);
    tracing::info!(worker = name, batch_size, "worker started");

    while running.get_acquire() {
        if consumer.poll(name, batch_size, &mut handler).is_idle() {
            consumer.ring().coordinator().consumer_wait();
        }
    }

    handler.on_shutdown(name);
    tracing::info!(worker = name, gating = consumer.ring().gating(), "worker stopped");
    consumer
}

impl<E> Drop for Worker<E> {
    fn drop(&mut self) {
        if let Some(Err(_)) = self.stop() {
            tracing::warn!(worker = %self.name, "worker panicked");
        }
    }
}

impl<E> fmt::Debug for Worker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("batch_size", &self.batch_size)
            .field("running", &self.running.get_acquire())
            .finish_non_exhaustive()
    }
}

/// Builds workers that share a name prefix, ring configuration and batch
/// limit. Each worker gets its own ring and the thread name
/// `"{name}-worker-{n}"`.
#[derive(Debug)]
pub struct WorkerFactory {
    name: String,
    config: Config,
    batch_limit: BatchSizeLimit,
    count: AtomicUsize,
}

impl WorkerFactory {
    pub fn new(name: impl Into<String>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            batch_limit: BatchSizeLimit::default(),
            count: AtomicUsize::new(0),
        })
    }

    /// Sets the poll batch limit of workers created afterwards.
    pub fn with_batch_limit(mut self, batch_limit: BatchSizeLimit) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates a stopped worker over a fresh ring filled by `factory`.
    pub fn create<E, F>(&self, factory: F) -> Result<Worker<E>>
    where
        E: Send + 'static,
        F: FnMut() -> E,
    {
        let ring = Arc::new(EventRing::new(self.config, factory)?);
        let n = self.count.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-worker-{}", self.name, n);
        tracing::debug!(worker = %name, capacity = self.config.capacity, "worker created");
        Worker::new(name, ring, self.batch_limit.get(self.config.capacity))
    }
}
