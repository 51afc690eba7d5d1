//! Four chained stages, each appending its own marker to the job.

use rand::Rng;
use stagepool::prelude::*;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>;

fn step(name: &'static str, max_delay_ms: u64) -> impl Fn(Context, String) -> StepFuture + Send + Sync {
    move |_ctx, job| {
        let delay = rand::thread_rng().gen_range(1..=max_delay_ms);
        let fut: StepFuture = Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let processed = format!("{job} {name}: processed");
            println!("{processed}");
            Ok(processed)
        });
        fut
    }
}

async fn finish(_ctx: Context, job: String) -> anyhow::Result<String> {
    Ok(format!("{job} done"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info", LogFormat::Pretty)?;

    let pool = Pool::builder(Context::background())
        .stage(Config::new(5, 100, 100, 0, false, step("one", 900)))
        .stage(Config::new(5, 100, 100, 0, false, step("two", 600)))
        .stage(Config::new(5, 100, 100, 0, false, step("three", 300)))
        .stage(Config::new(5, 100, 100, 0, false, finish))
        .build()?;
    pool.send_jobs((0..10).map(|i| format!("job {i}"))).await?;

    for result in pool.close()?.drain().await {
        println!("{result}");
    }
    for metrics in pool.metrics() {
        println!("{}", metrics.to_json());
    }
    Ok(())
}
