use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kaal_osapi::clock::TimeoutSchedule;
use kaal_osapi::{Mutex, Pool, Semaphore, Sweep};
use kaal_platform::Notification;
use std::hint::black_box;

const POOL_SIZES: &[usize] = &[16, 128, 1024];

/// Allocate the whole pool, then free it again
fn bench_pool_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_cycle");

    for &size in POOL_SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut pool: Pool<u64> = Pool::new(size);
            let mut handles = Vec::with_capacity(size);
            b.iter(|| {
                while let Ok(handle) = pool.allocate() {
                    handles.push(handle);
                }
                for handle in handles.drain(..) {
                    pool.free(black_box(handle)).unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Linear `find` over a full pool, worst case (last element)
fn bench_pool_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_find");

    for &size in POOL_SIZES {
        let mut pool: Pool<u64> = Pool::new(size);
        for value in 0..size as u64 {
            let handle = pool.allocate().unwrap();
            *pool.get_mut(handle) = value;
        }
        let probe = size as u64 - 1;

        group.bench_with_input(BenchmarkId::from_parameter(size), &probe, |b, probe| {
            b.iter(|| black_box(pool.find(probe)));
        });
    }
    group.finish();
}

/// Uncontended and recursive mutex acquisition
fn bench_mutex(c: &mut Criterion) {
    let mutex = Mutex::new();

    c.bench_function("mutex_lock_unlock", |b| {
        b.iter(|| {
            mutex.lock().unwrap();
            mutex.unlock().unwrap();
        });
    });

    c.bench_function("mutex_recursive_depth_4", |b| {
        b.iter(|| {
            for _ in 0..4 {
                mutex.lock().unwrap();
            }
            for _ in 0..4 {
                mutex.unlock().unwrap();
            }
        });
    });
}

/// Uncontended binary semaphore
fn bench_semaphore(c: &mut Criterion) {
    let semaphore = Semaphore::new(true, 17);

    c.bench_function("semaphore_take_give", |b| {
        b.iter(|| {
            semaphore.take(0).unwrap();
            semaphore.give().unwrap();
        });
    });
}

/// One timer tick over a full schedule of periodic timeouts
fn bench_schedule_fire(c: &mut Criterion) {
    let wake = Notification::new();
    let mut schedule = TimeoutSchedule::new(100);
    for period in 1..=100 {
        schedule.schedule(0, 0, true, period, wake.signaller()).unwrap();
    }

    let mut now = 0u32;
    c.bench_function("schedule_fire_100_periodic", |b| {
        b.iter(|| {
            now = now.wrapping_add(1);
            black_box(schedule.fire(now));
            wake.drain();
        });
    });
}

/// Sweep releasing half of a full pool
fn bench_pool_sweep(c: &mut Criterion) {
    c.bench_function("pool_sweep_release_half", |b| {
        let mut pool: Pool<u64> = Pool::new(256);
        b.iter(|| {
            while let Ok(handle) = pool.allocate() {
                *pool.get_mut(handle) = handle.index() as u64;
            }
            black_box(pool.sweep(|_, value| {
                if *value % 2 == 0 {
                    Sweep::Release
                } else {
                    Sweep::Keep
                }
            }));
            pool.sweep(|_, _| Sweep::Release);
        });
    });
}

criterion_group!(
    benches,
    bench_pool_cycle,
    bench_pool_find,
    bench_mutex,
    bench_semaphore,
    bench_schedule_fire,
    bench_pool_sweep
);
criterion_main!(benches);
