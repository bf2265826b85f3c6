//! Criterion benchmarks for the `Breaker::exec` happy path.
//!
//! Covers: closed-circuit dispatch overhead, rolling-window aggregation,
//! and percentile computation at a realistic sample count.

use std::hint::black_box;
use std::sync::Arc;

use asupersync::runtime::RuntimeBuilder;
use criterion::{criterion_group, criterion_main, Criterion};

use circuit_runtime::circuit::BoxFuture;
use circuit_runtime::config::BreakerConfig;
use circuit_runtime::stats::{mean, percentile};
use circuit_runtime::{Breaker, Operation};

fn op_always_ok() -> Operation<(), u32, String> {
    Arc::new(|_args: ()| Box::pin(async { Ok(1) }) as BoxFuture<'static, Result<u32, String>>)
}

fn bench_exec_closed_circuit(c: &mut Criterion) {
    let mut config = BreakerConfig::default();
    config.register_global = false;
    let breaker = Breaker::builder(op_always_ok()).config(config).build().unwrap();
    let runtime = RuntimeBuilder::new().build().unwrap();

    c.bench_function("exec_closed_circuit_success", |b| {
        b.iter(|| runtime.block_on(breaker.exec(black_box(()))));
    });

    breaker.destroy();
}

fn bench_percentile_over_window(c: &mut Criterion) {
    let samples: Vec<u32> = (0..2048).map(|i| (i * 7) % 500).collect();
    let mut sorted = samples.clone();
    sorted.sort_unstable();

    c.bench_function("percentile_p99_over_2048_samples", |b| {
        b.iter(|| percentile(black_box(&sorted), black_box(0.99)));
    });

    c.bench_function("mean_over_2048_samples", |b| {
        b.iter(|| mean(black_box(&sorted)));
    });
}

criterion_group!(benches, bench_exec_closed_circuit, bench_percentile_over_window);
criterion_main!(benches);
