use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use admission_policy::CompositeThrottler;
use admission_policy::KeyGenerator;
use admission_policy::LocalThrottler;
use admission_policy::Memoizer;
use admission_policy::NoopMetrics;
use admission_policy::RequestContext;
use admission_policy::StaticThrottler;
use admission_policy::Throttler;
use admission_policy::ACCOUNT_ID;
use admission_policy::REMOTE_ADDRESS;

const KEYS: [&str; 4] = ["k0", "k1", "k2", "k3"];

fn bench_single_throttler<T: Throttler>(group_name: &str, c: &mut Criterion, throttler: Arc<T>) {
    let mut group = c.benchmark_group(group_name);

    group.bench_function("single-threaded", |b| {
        b.iter(|| {
            let _ = black_box(throttler.as_ref()).is_throttled(black_box("k0"), &NoopMetrics);
        })
    });

    group.finish();
}

fn bench_parallel_throttler<T: Throttler + 'static>(
    group_name: &str,
    c: &mut Criterion,
    throttler: Arc<T>,
) {
    let mut group = c.benchmark_group(group_name);

    for threads in [2, 4, 8].iter() {
        let num_threads = *threads;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}-threads", num_threads)),
            &num_threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let barrier = Arc::new(Barrier::new(n + 1));
                    let mut handles = Vec::with_capacity(n);

                    for t in 0..n {
                        let th = Arc::clone(&throttler);
                        let bar = Arc::clone(&barrier);
                        let iters_per_thread = iters / n as u64;
                        // Spread threads over distinct keys so per-key locks rarely meet.
                        let key = KEYS[t % KEYS.len()];

                        handles.push(thread::spawn(move || {
                            bar.wait();
                            for _ in 0..iters_per_thread {
                                let _ = black_box(th.is_throttled(key, &NoopMetrics));
                            }
                        }));
                    }

                    barrier.wait();
                    let start = Instant::now();

                    for handle in handles {
                        let _ = handle.join();
                    }

                    start.elapsed()
                });
            },
        );
    }
    group.finish();
}

fn bench_memoized_request(c: &mut Criterion, throttler: Arc<dyn Throttler>) {
    let memoizer = Memoizer::new(throttler);
    let generator = KeyGenerator::default_identity();

    c.bench_function("Memoizer-request", |b| {
        b.iter(|| {
            let ctx = RequestContext::new()
                .with_identity(ACCOUNT_ID, "123")
                .with_identity(REMOTE_ADDRESS, "10.0.0.1");
            let keys = generator.keys(&ctx).unwrap_or_default();
            // Two passes: the second is served from the request's cache.
            for _ in 0..2 {
                for key in &keys {
                    let _ = black_box(memoizer.is_throttled(key, &ctx));
                }
            }
        })
    });
}

fn run_all_benches(c: &mut Criterion) {
    let limit = 1_000_000_000.0;
    let limits = KEYS.iter().map(|k| (*k, limit));

    let local = Arc::new(LocalThrottler::new(limits).unwrap());
    let list = Arc::new(StaticThrottler::deny(["blocked"]));
    let composite = Arc::new(CompositeThrottler::new([
        list.clone() as Arc<dyn Throttler>,
        local.clone() as Arc<dyn Throttler>,
    ]));

    bench_single_throttler("LocalThrottler", c, Arc::clone(&local));
    bench_parallel_throttler("LocalThrottler", c, local.clone());

    bench_single_throttler("StaticThrottler", c, Arc::clone(&list));

    bench_single_throttler("CompositeThrottler", c, Arc::clone(&composite));
    bench_parallel_throttler("CompositeThrottler", c, composite);

    bench_memoized_request(c, local);
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
