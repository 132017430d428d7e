//! Loom-based concurrency tests for seqring.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Under the `loom` feature every atomic in the crate is loom's, so these
//! models drive the real sequencer, availability buffer and pollers through
//! every interleaving loom can reach. Capacities are tiny to keep the state
//! space manageable.

#![cfg(feature = "loom")]

use loom::thread;
use seqring::{Channel, Config, ConsumerType, Consumer, PollState, ProducerType};

fn channel(capacity: usize, producer: ProducerType, consumer: ConsumerType) -> Channel<u64> {
    Channel::new(
        Config::default()
            .with_capacity(capacity)
            .with_producer(producer)
            .with_consumer(consumer),
    )
    .unwrap()
}

fn drain_until(consumer: &mut Consumer<u64>, expected: usize) -> Vec<u64> {
    let mut seen = Vec::new();
    while seen.len() < expected {
        if consumer.receive(4, |v| seen.push(v)) == PollState::Idle {
            thread::yield_now();
        }
    }
    seen
}

/// A value published by the single producer is visible to the consumer in
/// claim order.
#[test]
fn loom_single_producer_publication_is_ordered() {
    loom::model(|| {
        let channel = channel(2, ProducerType::Single, ConsumerType::Single);
        let mut producer = channel.producer().unwrap();
        let mut consumer = channel.consumer().unwrap();

        let handle = thread::spawn(move || {
            producer.push(1);
            producer.push(2);
        });

        assert_eq!(drain_until(&mut consumer, 2), vec![1, 2]);
        handle.join().unwrap();
    });
}

/// Two producers claim disjoint slots and may publish in either order; the
/// consumer sees both exactly once and never a slot whose publish has not
/// completed.
#[test]
fn loom_multi_producer_out_of_order_publication() {
    loom::model(|| {
        let channel = channel(2, ProducerType::Multi, ConsumerType::Single);
        let mut consumer = channel.consumer().unwrap();

        let producers: Vec<_> = [10, 20]
            .into_iter()
            .map(|value| {
                let mut producer = channel.producer().unwrap();
                thread::spawn(move || producer.push(value))
            })
            .collect();

        let mut seen = drain_until(&mut consumer, 2);
        seen.sort_unstable();
        assert_eq!(seen, vec![10, 20]);

        for producer in producers {
            producer.join().unwrap();
        }
        assert_eq!(channel.gating(), 1);
    });
}

/// A full ring makes the producer wait for the consumer's gating release.
#[test]
fn loom_producer_waits_for_gating() {
    loom::model(|| {
        let channel = channel(1, ProducerType::Single, ConsumerType::Single);
        let mut producer = channel.producer().unwrap();
        let mut consumer = channel.consumer().unwrap();

        let handle = thread::spawn(move || {
            producer.push(1);
            // Blocks until the consumer released sequence 0.
            producer.push(2);
        });

        assert_eq!(drain_until(&mut consumer, 2), vec![1, 2]);
        handle.join().unwrap();
    });
}

/// Competing consumers each drain a disjoint range and gating ends at the
/// last sequence without ever regressing.
#[test]
fn loom_competing_consumers_advance_gating_monotonically() {
    loom::model(|| {
        let channel = channel(2, ProducerType::Single, ConsumerType::Multi);
        channel.producer().unwrap().push_batch([1, 2]).unwrap();

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let mut consumer = channel.consumer().unwrap();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    consumer.receive(1, |v| seen.push(v));
                    seen
                })
            })
            .collect();

        let mut last_gating = channel.gating();
        let mut seen: Vec<u64> = Vec::new();
        for consumer in consumers {
            let gating = channel.gating();
            assert!(gating >= last_gating);
            last_gating = gating;
            seen.extend(consumer.join().unwrap());
        }

        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(channel.gating(), 1);
    });
}

/// Two threads racing for the producer of a single-producer channel: one
/// wins, the other is refused, and whatever the winner pushed is intact.
#[test]
fn loom_single_producer_admits_one_thread() {
    loom::model(|| {
        let channel = channel(2, ProducerType::Single, ConsumerType::Single);

        let racers: Vec<_> = [1, 2]
            .into_iter()
            .map(|value| {
                let channel = channel.clone();
                thread::spawn(move || match channel.producer() {
                    Ok(mut producer) => {
                        producer.push(value);
                        true
                    }
                    Err(_) => false,
                })
            })
            .collect();

        let admitted = racers
            .into_iter()
            .map(|racer| racer.join().unwrap())
            .filter(|&pushed| pushed)
            .count();
        assert!((1..=2).contains(&admitted));

        let mut consumer = channel.consumer().unwrap();
        let mut seen = Vec::new();
        consumer.receive(2, |v| seen.push(v));
        assert_eq!(seen.len(), admitted);
    });
}
