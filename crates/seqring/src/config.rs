use crate::error::{check_capacity, Result};
use crate::wait::{ConsumerWaitStrategy, ProducerWaitStrategy};

/// How many threads may claim sequences concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProducerType {
    /// Exactly one producer thread. Claims need no atomic read-modify-write.
    #[default]
    Single,
    /// Any number of producer threads. Claims use fetch-and-add on the cursor
    /// and publication goes through the availability buffer.
    Multi,
}

/// How many threads may poll concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerType {
    /// Exactly one consumer thread owns the gating sequence.
    #[default]
    Single,
    /// Competing consumers share one progression; each batch goes to
    /// exactly one of them.
    Multi,
}

/// Configuration for rings and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of slots (must be a power of two)
    pub capacity: usize,
    /// Producer multiplicity
    pub producer: ProducerType,
    /// Consumer multiplicity
    pub consumer: ConsumerType,
    /// What a producer does while the ring is full
    pub producer_wait: ProducerWaitStrategy,
    /// What a blocking consumer does while the ring is empty
    pub consumer_wait: ConsumerWaitStrategy,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    pub const fn new(
        capacity: usize,
        producer: ProducerType,
        consumer: ConsumerType,
        producer_wait: ProducerWaitStrategy,
        consumer_wait: ConsumerWaitStrategy,
    ) -> Self {
        Self {
            capacity,
            producer,
            consumer,
            producer_wait,
            consumer_wait,
            enable_metrics: false,
        }
    }

    /// Sets the capacity.
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the producer multiplicity.
    pub const fn with_producer(mut self, producer: ProducerType) -> Self {
        self.producer = producer;
        self
    }

    /// Sets the consumer multiplicity.
    pub const fn with_consumer(mut self, consumer: ConsumerType) -> Self {
        self.consumer = consumer;
        self
    }

    /// Sets both wait strategies.
    pub const fn with_wait(
        mut self,
        producer_wait: ProducerWaitStrategy,
        consumer_wait: ConsumerWaitStrategy,
    ) -> Self {
        self.producer_wait = producer_wait;
        self.consumer_wait = consumer_wait;
        self
    }

    /// Enables or disables metrics collection.
    pub const fn with_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    /// Checks the capacity. Every constructor calls this first.
    pub fn validate(&self) -> Result<()> {
        check_capacity(self.capacity).map(|_| ())
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            1 << 16, // 64K slots
            ProducerType::Single,
            ConsumerType::Single,
            ProducerWaitStrategy::Spinning,
            ConsumerWaitStrategy::Spinning,
        )
    }
}

/// Low latency configuration (4K slots, both sides spin)
pub const LOW_LATENCY_CONFIG: Config = Config::new(
    1 << 12,
    ProducerType::Single,
    ConsumerType::Single,
    ProducerWaitStrategy::Spinning,
    ConsumerWaitStrategy::Spinning,
);

/// Low CPU configuration (64K slots, producers yield, consumers block)
pub const LOW_CPU_CONFIG: Config = Config::new(
    1 << 16,
    ProducerType::Multi,
    ConsumerType::Single,
    ProducerWaitStrategy::Yielding,
    ConsumerWaitStrategy::Blocking,
);

/// Poll batch limit expressed as a fraction of the ring capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchSizeLimit {
    /// The whole ring.
    #[default]
    Full,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
}

impl BatchSizeLimit {
    /// Batch limit for a ring of `capacity` slots, never less than one.
    pub const fn get(self, capacity: usize) -> usize {
        let shift = match self {
            Self::Full => 0,
            Self::Half => 1,
            Self::Quarter => 2,
            Self::Eighth => 3,
            Self::Sixteenth => 4,
        };
        let limit = capacity >> shift;
        if limit == 0 {
            1
        } else {
            limit
        }
    }
}
