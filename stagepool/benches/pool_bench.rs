//! Benchmarks for pool throughput across job and worker counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stagepool::prelude::*;
use std::time::Duration;

async fn work(_ctx: Context, job: u32) -> anyhow::Result<u32> {
    tokio::time::sleep(Duration::from_millis(1)).await;
    Ok(job)
}

async fn run_pool(jobs: u32, workers: usize) -> usize {
    let pool = Pool::new(Context::new(), Config::with_defaults(workers, work)).expect("valid config");
    pool.send_jobs(0..jobs).await.expect("pool accepts jobs");
    let results = pool.close().expect("first close").drain().await;
    results.len()
}

async fn run_pipeline(jobs: u32, workers: usize) -> usize {
    let pool = Pool::builder(Context::new())
        .stage(Config::with_defaults(workers, work))
        .stage(Config::with_defaults(workers, work))
        .build()
        .expect("valid config");
    pool.send_jobs(0..jobs).await.expect("pool accepts jobs");
    let results = pool.close().expect("first close").drain().await;
    results.len()
}

fn pool_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("pool");

    for (jobs, workers) in [(10, 5), (10, 10), (10, 20), (20, 20)] {
        let label = format!("{jobs}_jobs_{workers}_workers");
        group.bench_with_input(BenchmarkId::new("single_stage", &label), &(jobs, workers), |b, &(jobs, workers)| {
            b.iter(|| black_box(runtime.block_on(run_pool(jobs, workers))));
        });
        group.bench_with_input(BenchmarkId::new("two_stage", &label), &(jobs, workers), |b, &(jobs, workers)| {
            b.iter(|| black_box(runtime.block_on(run_pipeline(jobs, workers))));
        });
    }

    group.finish();
}

criterion_group!(benches, pool_benchmark);
criterion_main!(benches);
