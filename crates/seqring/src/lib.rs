//! seqring - Sequenced Lock-Free Ring Buffer
//!
//! A fixed-size, power-of-two ring of slots coordinated by monotonically
//! increasing 64-bit sequences. Producers claim sequences, fill the slots
//! and publish them; consumers poll the contiguous published prefix, drain
//! it and release the slots back to producers through a gating sequence.
//!
//! # Key Features
//!
//! - Single-producer claims without atomic read-modify-write
//! - Multi-producer claims by fetch-and-add, with out-of-order publication
//!   resolved by a lap-tagged availability buffer
//! - Single-consumer and competing multi-consumer pollers
//! - Batch claim/publish and batch drain (one synchronization per range)
//! - Pluggable spin/yield/park/block wait strategies
//! - Flyweight event rings (no allocation after construction) and owned
//!   value queues
//! - Cache-line padded sequences and slot arrays
//! - Producer and consumer handles: a single side admits one handle at a
//!   time, so the single-producer and single-consumer fast paths stay sound
//!
//! # Example
//!
//! ```
//! use seqring::{Channel, PollState};
//!
//! let channel = Channel::<u64>::mpsc(1024).unwrap();
//!
//! let producers: Vec<_> = (0..4)
//!     .map(|p| {
//!         let mut producer = channel.producer().unwrap();
//!         std::thread::spawn(move || {
//!             for i in 0..100 {
//!                 producer.push(p * 1000 + i);
//!             }
//!         })
//!     })
//!     .collect();
//! for producer in producers {
//!     producer.join().unwrap();
//! }
//!
//! // Single consumer: only one consumer handle exists at a time.
//! let mut consumer = channel.consumer().unwrap();
//! assert!(channel.consumer().is_err());
//!
//! let mut received = 0;
//! while consumer.receive(256, |_| received += 1) == PollState::Processing {}
//! assert_eq!(received, 400);
//! ```

mod availability;
mod channel;
mod config;
mod error;
mod event_ring;
mod handler;
mod invariants;
mod metrics;
mod poller;
mod ring;
mod sequence;
mod sequencer;
mod sync;
mod wait;
mod worker;

pub use availability::AvailabilityBuffer;
pub use channel::{Channel, Consumer, Producer};
pub use config::{
    BatchSizeLimit, Config, ConsumerType, ProducerType, LOW_CPU_CONFIG, LOW_LATENCY_CONFIG,
};
pub use error::{Result, RingError, MAX_CAPACITY};
pub use event_ring::{EventConsumer, EventProducer, EventRing};
pub use handler::{EventHandler, HandlerError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use poller::{MultiConsumerPoller, PollState, Poller, SingleConsumerPoller};
pub use sequence::{PaddedFlag, Sequence};
pub use sequencer::{Sequencer, SequencerCore};
pub use wait::{ConsumerWaitStrategy, Coordinator, ProducerWaitStrategy};
pub use worker::{Worker, WorkerFactory};
