use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Mutex;

use lowlat::TtasSpinlock;

const OPS_PER_ITER: u64 = 10_000;

/// Uncontended acquire/release, with std::sync::Mutex as the baseline.
fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("spinlock");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("uncontended_lock_unlock", |b| {
        let lock = TtasSpinlock::new();
        let mut counter = 0u64;
        b.iter(|| {
            for _ in 0..OPS_PER_ITER {
                let _guard = lock.lock();
                counter = black_box(counter.wrapping_add(1));
            }
        })
    });

    group.bench_function("uncontended_try_lock", |b| {
        let lock = TtasSpinlock::new();
        b.iter(|| {
            for _ in 0..OPS_PER_ITER {
                let guard = lock.try_lock();
                black_box(guard.is_some());
            }
        })
    });

    group.bench_function("uncontended_std_mutex", |b| {
        let lock = Mutex::new(0u64);
        b.iter(|| {
            for _ in 0..OPS_PER_ITER {
                let mut v = lock.lock().unwrap();
                *v = black_box(v.wrapping_add(1));
            }
        })
    });

    group.finish();
}

/// Four threads fighting over one counter; measures full convoy behavior,
/// backoff included.
fn bench_contended(c: &mut Criterion) {
    use std::cell::UnsafeCell;
    use std::sync::Arc;

    struct Counter {
        lock: TtasSpinlock,
        value: UnsafeCell<u64>,
    }
    // SAFETY: value is only touched while lock is held.
    unsafe impl Sync for Counter {}

    let mut group = c.benchmark_group("spinlock");
    group.throughput(Throughput::Elements(OPS_PER_ITER));
    group.sample_size(10);

    group.bench_function("contended_4_threads", |b| {
        b.iter(|| {
            let shared = Arc::new(Counter {
                lock: TtasSpinlock::new(),
                value: UnsafeCell::new(0),
            });
            let per_thread = OPS_PER_ITER / 4;

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let shared = shared.clone();
                    std::thread::spawn(move || {
                        for _ in 0..per_thread {
                            let _guard = shared.lock.lock();
                            // SAFETY: the guard gives exclusive access.
                            unsafe { *shared.value.get() += 1 };
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            // SAFETY: all threads joined.
            assert_eq!(unsafe { *shared.value.get() }, per_thread * 4);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);
