//! Wait strategies and the coordinator that pairs them.
//!
//! The claim and poll algorithms never decide how to wait; they call
//! [`Coordinator::producer_wait`] when the ring is full and
//! [`Coordinator::consumer_wait`] when it is empty, and retry afterwards.
//! Only [`ConsumerWaitStrategy::Blocking`] actually sleeps until signalled,
//! so only it needs [`Coordinator::wakeup_consumer`] after a publish.

use crate::sync::{self, Condvar, Mutex};
use std::fmt;
use std::sync::PoisonError;

/// Producer behavior while waiting for consumers to free a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerWaitStrategy {
    /// Busy-spin with a CPU relax hint. Lowest latency, burns a core.
    #[default]
    Spinning,
    /// Yield the time slice to the OS scheduler.
    Yielding,
    /// Park for the shortest timed interval the OS allows.
    Parking,
}

impl ProducerWaitStrategy {
    #[inline]
    fn wait(self) {
        match self {
            Self::Spinning => sync::spin_loop(),
            Self::Yielding => sync::yield_now(),
            Self::Parking => sync::park_briefly(),
        }
    }
}

/// Consumer behavior while waiting for producers to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerWaitStrategy {
    /// Busy-spin with a CPU relax hint.
    #[default]
    Spinning,
    /// Yield the time slice to the OS scheduler.
    Yielding,
    /// Park for the shortest timed interval the OS allows.
    Parking,
    /// Sleep on a condition variable until a producer signals.
    Blocking,
}

/// Mutex/condvar pair behind [`ConsumerWaitStrategy::Blocking`].
///
/// `signalled` latches a wakeup that arrives while no consumer is waiting,
/// so a publish that races with a consumer going to sleep is never lost.
struct Blocker {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl Blocker {
    fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut signalled = self
            .signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*signalled {
            signalled = self
                .condvar
                .wait(signalled)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *signalled = false;
    }

    fn signal(&self) {
        let mut signalled = self
            .signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *signalled = true;
        self.condvar.notify_all();
    }
}

impl fmt::Debug for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocker").finish_non_exhaustive()
    }
}

/// One producer-side and one consumer-side wait strategy.
#[derive(Debug)]
pub struct Coordinator {
    producer: ProducerWaitStrategy,
    consumer: ConsumerWaitStrategy,
    blocker: Option<Blocker>,
}

impl Coordinator {
    pub fn new(producer: ProducerWaitStrategy, consumer: ConsumerWaitStrategy) -> Self {
        let blocker = match consumer {
            ConsumerWaitStrategy::Blocking => Some(Blocker::new()),
            _ => None,
        };
        Self {
            producer,
            consumer,
            blocker,
        }
    }

    /// Producer-side wait strategy.
    #[inline]
    pub fn producer_strategy(&self) -> ProducerWaitStrategy {
        self.producer
    }

    /// Consumer-side wait strategy.
    #[inline]
    pub fn consumer_strategy(&self) -> ConsumerWaitStrategy {
        self.consumer
    }

    /// Called by a producer each time it finds the ring full.
    #[inline]
    pub fn producer_wait(&self) {
        self.producer.wait();
    }

    /// Called by a consumer each time a poll comes back idle.
    #[inline]
    pub fn consumer_wait(&self) {
        match self.consumer {
            ConsumerWaitStrategy::Spinning => sync::spin_loop(),
            ConsumerWaitStrategy::Yielding => sync::yield_now(),
            ConsumerWaitStrategy::Parking => sync::park_briefly(),
            ConsumerWaitStrategy::Blocking => {
                if let Some(blocker) = &self.blocker {
                    blocker.wait();
                }
            }
        }
    }

    /// Called after a publish. No-op unless consumers block.
    #[inline]
    pub fn wakeup_consumer(&self) {
        if let Some(blocker) = &self.blocker {
            blocker.signal();
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(ProducerWaitStrategy::default(), ConsumerWaitStrategy::default())
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_non_blocking_strategies_return() {
        for producer in [
            ProducerWaitStrategy::Spinning,
            ProducerWaitStrategy::Yielding,
            ProducerWaitStrategy::Parking,
        ] {
            for consumer in [
                ConsumerWaitStrategy::Spinning,
                ConsumerWaitStrategy::Yielding,
                ConsumerWaitStrategy::Parking,
            ] {
                let coordinator = Coordinator::new(producer, consumer);
                coordinator.producer_wait();
                coordinator.consumer_wait();
                coordinator.wakeup_consumer();
            }
        }
    }

    #[test]
    fn test_blocking_wakeup_before_wait_is_not_lost() {
        let coordinator =
            Coordinator::new(ProducerWaitStrategy::Spinning, ConsumerWaitStrategy::Blocking);
        coordinator.wakeup_consumer();
        // Returns immediately thanks to the latched signal.
        coordinator.consumer_wait();
    }

    #[test]
    fn test_blocking_consumer_wakes_on_signal() {
        let coordinator = Arc::new(Coordinator::new(
            ProducerWaitStrategy::Spinning,
            ConsumerWaitStrategy::Blocking,
        ));
        let woke = Arc::new(AtomicBool::new(false));

        let handle = {
            let coordinator = Arc::clone(&coordinator);
            let woke = Arc::clone(&woke);
            thread::spawn(move || {
                coordinator.consumer_wait();
                woke.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        coordinator.wakeup_consumer();
        handle.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }
}
