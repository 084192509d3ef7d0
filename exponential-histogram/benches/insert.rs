use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use exponential_histogram::sketch::SimpleSketch;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn insert_uniform(c: &mut Criterion) {
    let _ = env_logger::try_init();
    let mut group = c.benchmark_group("insert");
    for scale in [4, 12] {
        group.bench_with_input(BenchmarkId::new("default_policy", scale), &scale, |b, &scale| {
            let mut rng = StdRng::seed_from_u64(0xE6);
            b.iter_batched(
                || {
                    exponential_histogram::SimpleSketch::new(
                        320,
                        scale,
                        true,
                        exponential_histogram::IndexerPolicy::AutoSelect,
                    )
                    .unwrap()
                },
                |mut sketch: SimpleSketch| {
                    for _ in 0..1000 {
                        let v: f64 = rng.gen_range(1.0..1_000_000.0);
                        sketch.insert(v, 1).unwrap();
                    }
                    sketch
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn percentiles(c: &mut Criterion) {
    let mut sketch = SimpleSketch::default();
    let mut rng = StdRng::seed_from_u64(0xE6);
    for _ in 0..100_000 {
        let v: f64 = rng.gen_range(1.0..1_000_000.0);
        sketch.insert(v, 1).unwrap();
    }
    c.bench_function("percentiles_p50_p90_p99", |b| {
        b.iter(|| {
            let mut thresholds = [50.0, 90.0, 99.0];
            sketch.percentiles(&mut thresholds)
        });
    });
}

criterion_group!(benches, insert_uniform, percentiles);
criterion_main!(benches);
