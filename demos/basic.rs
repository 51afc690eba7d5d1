//! A single stage of five workers turning string jobs into string results.

use rand::Rng;
use stagepool::prelude::*;
use std::time::Duration;

async fn worker(_ctx: Context, job: String) -> anyhow::Result<String> {
    let delay = rand::thread_rng().gen_range(100..300);
    tokio::time::sleep(Duration::from_millis(delay)).await;
    Ok(format!("{job} done"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info", LogFormat::Pretty)?;

    // Results are read after close, so the result queue must hold all of them.
    let pool = Pool::new(
        Context::background(),
        Config::with_defaults(5, worker).with_queue_limits(5, 20),
    )?;
    pool.send_jobs((0..20).map(|i| format!("job {i}"))).await?;

    // Ends once every worker has exited.
    let mut results = pool.close()?;
    while let Some(result) = results.recv().await {
        println!("{result}");
    }
    Ok(())
}
