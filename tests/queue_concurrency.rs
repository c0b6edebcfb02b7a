//! Cross-thread queue scenarios: element uniqueness under real contention.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use lowlat::{MpmcRingBuffer, SpscRingBuffer};

/// P producers push disjoint value ranges, K consumers drain concurrently;
/// the union of everything popped must be exactly the pushed set.
#[test]
fn mpmc_concurrent_uniqueness() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 1000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(MpmcRingBuffer::with_capacity(1024));
    let popped = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut v = (p * PER_PRODUCER + i) as u64;
                    loop {
                        match queue.try_push(v) {
                            Ok(()) => break,
                            Err(back) => {
                                v = back;
                                std::hint::spin_loop();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            thread::spawn(move || {
                let mut log = Vec::new();
                while popped.load(Ordering::Relaxed) < TOTAL {
                    match queue.try_pop() {
                        Some(v) => {
                            log.push(v);
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                        None => std::hint::spin_loop(),
                    }
                }
                log
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }

    let mut seen = HashSet::with_capacity(TOTAL);
    for c in consumers {
        for v in c.join().unwrap() {
            assert!(seen.insert(v), "value {v} popped twice");
        }
    }
    assert_eq!(seen.len(), TOTAL, "some values were lost");
    assert!(queue.try_pop().is_none());
}

/// Per-producer order survives through the MPMC queue: consumers tag each
/// pop with its source, and every source's subsequence must be increasing.
#[test]
fn mpmc_preserves_per_producer_order() {
    const PRODUCERS: u64 = 2;
    const PER_PRODUCER: u64 = 2000;

    let queue = Arc::new(MpmcRingBuffer::with_capacity(64));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut v = (p << 32) | i;
                    loop {
                        match queue.try_push(v) {
                            Ok(()) => break,
                            Err(back) => {
                                v = back;
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let mut last_seen = vec![None::<u64>; PRODUCERS as usize];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        if let Some(v) = queue.try_pop() {
            let source = (v >> 32) as usize;
            let seq = v & 0xFFFF_FFFF;
            if let Some(prev) = last_seen[source] {
                assert!(seq > prev, "producer {source} reordered: {prev} then {seq}");
            }
            last_seen[source] = Some(seq);
            received += 1;
        }
    }

    for p in producers {
        p.join().unwrap();
    }
}

/// SPSC pipeline under sustained pressure with a tiny ring: strict FIFO,
/// nothing lost, nothing duplicated.
#[test]
fn spsc_sustained_fifo_pressure() {
    const COUNT: u64 = 200_000;

    let (mut tx, mut rx) = SpscRingBuffer::with_capacity(4).split();

    let producer = thread::spawn(move || {
        for i in 0..COUNT {
            let mut v = i;
            loop {
                match tx.try_push(v) {
                    Ok(()) => break,
                    Err(back) => {
                        v = back;
                        std::hint::spin_loop();
                    }
                }
            }
        }
    });

    let mut expected = 0u64;
    while expected < COUNT {
        if let Some(v) = rx.try_pop() {
            assert_eq!(v, expected);
            expected += 1;
        } else {
            std::hint::spin_loop();
        }
    }

    producer.join().unwrap();
    assert!(rx.try_pop().is_none());
}
