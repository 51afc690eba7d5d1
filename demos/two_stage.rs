//! Two chained stages: strings are measured, then the lengths are reported.

use rand::Rng;
use stagepool::prelude::*;
use std::time::Duration;

async fn measure(_ctx: Context, job: String) -> anyhow::Result<usize> {
    let delay = rand::thread_rng().gen_range(50..200);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    Ok(job.len())
}

async fn report(_ctx: Context, len: usize) -> anyhow::Result<String> {
    if len % 4 == 0 {
        anyhow::bail!("refusing length {len}");
    }
    Ok(format!("length {len} reported"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info", LogFormat::Pretty)?;

    let pool = Pool::builder(Context::background())
        .stage(Config::new(5, 100, 100, 0, false, measure))
        .stage(Config::new(3, 100, 100, 0, false, report))
        .build()?;
    pool.send_jobs((0..20).map(|i| "x".repeat(i + 1))).await?;

    for result in pool.close()?.drain().await {
        println!("{result}");
    }
    for error in pool.errors() {
        println!("failed: {error}");
    }
    Ok(())
}
