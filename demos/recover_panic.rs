//! A retrying stage whose worker panics at random, reading its parameters
//! from the shared context.

use rand::Rng;
use stagepool::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Job {
    name: String,
}

#[derive(Debug)]
struct Outcome {
    took: Duration,
    name: String,
}

async fn worker(ctx: Context, job: Job) -> anyhow::Result<Outcome> {
    let label: String = ctx
        .value_as("label")
        .ok_or_else(|| anyhow::anyhow!("label missing from context"))?;
    let attempt_id: u32 = ctx.value_as("attempt_id").unwrap_or_default();

    let started = Instant::now();
    let n = rand::thread_rng().gen_range(1..10_u64);
    tokio::time::sleep(Duration::from_millis(n * 50)).await;
    if n % 3 == 0 {
        panic!("random panic {attempt_id}");
    }
    Ok(Outcome {
        took: started.elapsed(),
        name: format!("{} done with {label}", job.name),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info", LogFormat::Pretty)?;

    let ctx = Context::background()
        .with_value("label", "first-value")
        .with_value("attempt_id", 2);
    let pool = Pool::new(ctx, Config::new(5, 100, 100, 20, true, worker))?;
    pool.send_jobs((0..20).map(|i| Job { name: format!("job {i}") })).await?;

    for outcome in pool.close()?.drain().await {
        println!("{} in {:?}", outcome.name, outcome.took);
    }
    for error in pool.errors() {
        println!("gave up: {error}");
    }
    Ok(())
}
