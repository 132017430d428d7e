use thiserror::Error;

/// Largest supported capacity (2^30 slots).
pub const MAX_CAPACITY: usize = 1 << 30;

/// Error types for construction, claiming and worker lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// Capacity is zero or not a power of two.
    #[error("capacity must be a power of two, got {capacity}")]
    NotPowerOfTwo {
        /// The rejected capacity.
        capacity: usize,
    },
    /// Capacity exceeds [`MAX_CAPACITY`].
    #[error("capacity {capacity} exceeds maximum {max}")]
    CapacityTooLarge {
        /// The rejected capacity.
        capacity: usize,
        /// The supported maximum.
        max: usize,
    },
    /// A claim of zero slots or of more slots than the ring holds.
    #[error("cannot claim {requested} slots from a ring of capacity {capacity}")]
    InvalidClaim {
        /// Number of slots requested.
        requested: usize,
        /// Ring capacity.
        capacity: usize,
    },
    /// A poll batch limit of zero.
    #[error("batch size must be greater than zero, got {batch_size}")]
    InvalidBatchSize {
        /// The rejected batch size.
        batch_size: usize,
    },
    /// A single-producer ring already has a live producer handle.
    #[error("single-producer ring already has a producer")]
    ProducerTaken,
    /// A single-consumer ring already has a live consumer handle.
    #[error("single-consumer ring already has a consumer")]
    ConsumerTaken,
    /// `Worker::start` called on a worker that is already running.
    #[error("worker is already started")]
    WorkerAlreadyStarted,
    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl RingError {
    /// Returns `true` for errors raised while validating a configuration.
    #[inline]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::NotPowerOfTwo { .. }
                | Self::CapacityTooLarge { .. }
                | Self::InvalidClaim { .. }
                | Self::InvalidBatchSize { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, RingError>;

/// Validates a ring capacity.
pub(crate) fn check_capacity(capacity: usize) -> Result<usize> {
    if !capacity.is_power_of_two() {
        return Err(RingError::NotPowerOfTwo { capacity });
    }
    if capacity > MAX_CAPACITY {
        return Err(RingError::CapacityTooLarge {
            capacity,
            max: MAX_CAPACITY,
        });
    }
    Ok(capacity)
}

/// Validates a claim size against a capacity.
#[inline]
pub(crate) fn check_claim(requested: usize, capacity: usize) -> Result<()> {
    if requested == 0 || requested > capacity {
        return Err(RingError::InvalidClaim {
            requested,
            capacity,
        });
    }
    Ok(())
}
