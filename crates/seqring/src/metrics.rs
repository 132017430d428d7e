use crate::sync::{AtomicU64, Ordering};

/// Counters collected when `Config::enable_metrics` is set.
///
/// All updates are relaxed; a snapshot is a point-in-time approximation.
#[derive(Debug)]
pub struct Metrics {
    items_published: AtomicU64,
    items_consumed: AtomicU64,
    batches_consumed: AtomicU64,
    producer_waits: AtomicU64,
    idle_polls: AtomicU64,
    handler_errors: AtomicU64,
}

/// Plain copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_published: u64,
    pub items_consumed: u64,
    pub batches_consumed: u64,
    pub producer_waits: u64,
    pub idle_polls: u64,
    pub handler_errors: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            items_published: AtomicU64::new(0),
            items_consumed: AtomicU64::new(0),
            batches_consumed: AtomicU64::new(0),
            producer_waits: AtomicU64::new(0),
            idle_polls: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn add_items_published(&self, n: u64) {
        self.items_published.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_batch_consumed(&self, n: u64) {
        self.items_consumed.fetch_add(n, Ordering::Relaxed);
        self.batches_consumed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_producer_wait(&self) {
        self.producer_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_idle_poll(&self) {
        self.idle_polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_published: self.items_published.load(Ordering::Relaxed),
            items_consumed: self.items_consumed.load(Ordering::Relaxed),
            batches_consumed: self.batches_consumed.load(Ordering::Relaxed),
            producer_waits: self.producer_waits.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
