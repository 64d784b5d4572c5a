use std::sync::Arc;

use brimcache::{Builder, Cache, Executor};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

fn inline_executor() -> Executor {
    Arc::new(|job: brimcache::Job| job())
}

fn populated_cache(capacity: u64) -> Cache<u64, u64> {
    let cache = Builder::new()
        .maximum_size(capacity)
        .executor(inline_executor())
        .build();
    for i in 0..capacity {
        cache.set(i, i);
    }
    cache.clean_up();
    cache
}

fn bench_get_hot(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_ops");
    group.throughput(Throughput::Elements(4096));
    let cache = populated_cache(1024);
    group.bench_function("get_hot", |b| {
        b.iter(|| {
            for i in 0..4096u64 {
                let _ = std::hint::black_box(cache.get_if_present(&std::hint::black_box(i % 1024)));
            }
        })
    });
    group.finish();
}

fn bench_insert_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_ops");
    group.throughput(Throughput::Elements(4096));
    group.bench_function("insert_churn", |b| {
        b.iter_batched(
            || populated_cache(1024),
            |cache| {
                for i in 0..4096u64 {
                    cache.set(std::hint::black_box(10_000 + i), i);
                }
                cache.clean_up();
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_mixed_zipfish(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_ops");
    group.throughput(Throughput::Elements(4096));
    let cache = populated_cache(1024);
    group.bench_function("mixed_read_write", |b| {
        let mut state = 0x5EEDu64;
        b.iter(|| {
            for _ in 0..4096u64 {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let key = (state >> 33) % 4096;
                if cache.get_if_present(&key).is_none() {
                    cache.set(key, key);
                }
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_get_hot, bench_insert_churn, bench_mixed_zipfish);
criterion_main!(benches);
