use archipelago::config::{IslandLayout, MigrationModel, SimulationConfig};
use archipelago::engine::TrialRunner;
use archipelago::expr::parse;
use archipelago::poisson::PoissonCache;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::hint::black_box;
use std::sync::Arc;

fn bench_config() -> SimulationConfig {
    SimulationConfig {
        payoff: "x * (1 - X) - x^2 / 2".to_string(),
        lower: 0.0,
        upper: 1.0,
        slices: 8,
        islands: IslandLayout::Uniform {
            count: 8,
            population: 20,
        },
        migration: MigrationModel::Uniform { rate: 0.1 },
        generations: 500,
        threads: 1,
        ..Default::default()
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let config = Arc::new(bench_config().validate().unwrap());
    let mut runner = TrialRunner::new(config, Some(42));

    c.bench_function("trial_8x20", |b| {
        b.iter(|| black_box(runner.run(black_box(0.45), black_box(0.5), 3).unwrap()))
    });

    let mut cache = PoissonCache::new();
    let mut rng = SmallRng::seed_from_u64(1);
    c.bench_function("poisson_sample_cached", |b| {
        b.iter(|| black_box(cache.sample(&mut rng, black_box(1.37))))
    });

    let program = parse("x * (1 / X) - x + sqrt(n) * exp(-x)").unwrap();
    c.bench_function("payoff_eval", |b| {
        b.iter(|| black_box(program.eval(black_box(0.3), black_box(0.6), black_box(20.0))))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
