//! Shared-memory SPSC ring over a real POSIX segment.
//!
//! A second process is stood in for by a second, independent mapping of the
//! same named segment inside this one. The views share no Rust state, only
//! the mapped bytes, which is exactly what two processes would share.

#![cfg(unix)]

use std::thread;

use lowlat::platform::ShmRegion;
use lowlat::ShmSpscRing;

fn unique_name(tag: &str) -> String {
    format!("/lowlat_test_{}_{}", tag, std::process::id())
}

#[test]
fn create_and_attach_round_trip() {
    let name = unique_name("roundtrip");
    let size = ShmSpscRing::<u64>::region_size(16);

    let producer_region = ShmRegion::create(&name, size).expect("create segment");
    let consumer_region = ShmRegion::attach(&name, size).expect("attach segment");

    // SAFETY: the regions stay mapped for the rings' lifetimes; this test is
    // the only producer and the only consumer.
    let mut producer = unsafe { ShmSpscRing::<u64>::create_in(&producer_region, 16) };
    let mut consumer = unsafe { ShmSpscRing::<u64>::attach_to(&consumer_region) };

    assert_eq!(consumer.capacity(), 16);
    assert!(consumer.is_empty());

    for i in 0..15u64 {
        assert!(producer.try_push(i).is_ok());
    }
    // One slot is the gap.
    assert!(producer.try_push(15).is_err());

    for i in 0..15u64 {
        assert_eq!(consumer.try_pop(), Some(i));
    }
    assert_eq!(consumer.try_pop(), None);
}

#[test]
fn producer_and_consumer_on_separate_mappings() {
    let name = unique_name("threads");
    const COUNT: u64 = 50_000;

    let size = ShmSpscRing::<u64>::region_size(64);
    let producer_region = ShmRegion::create(&name, size).expect("create segment");
    // SAFETY: single producer; the region outlives the ring.
    let mut producer = unsafe { ShmSpscRing::<u64>::create_in(&producer_region, 64) };

    let consumer_region = ShmRegion::attach(&name, size).expect("attach segment");

    let consumer_thread = thread::spawn(move || {
        // SAFETY: single consumer on its own mapping of the same segment.
        let mut consumer = unsafe { ShmSpscRing::<u64>::attach_to(&consumer_region) };
        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = consumer.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
    });

    for i in 0..COUNT {
        let mut v = i;
        loop {
            match producer.try_push(v) {
                Ok(()) => break,
                Err(back) => {
                    v = back;
                    std::hint::spin_loop();
                }
            }
        }
    }

    consumer_thread.join().unwrap();
}
