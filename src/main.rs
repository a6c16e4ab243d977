use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use firmsched::config::Config;
use firmsched::runner::HttpJobRunner;
use firmsched::scheduler::{Scheduler, SchedulerOptions};
use firmsched::task::Machine;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cfg_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Config::load(cfg_path)?;
    info!("starting firmsched dispatcher with config {:?}", cfg);

    let runner = Arc::new(HttpJobRunner::new(
        cfg.runner_url.clone(),
        cfg.runner_timeout(),
    )?);
    let scheduler: Arc<Scheduler<Machine, HttpJobRunner>> =
        Scheduler::new(SchedulerOptions::from(&cfg), runner);
    scheduler.start();

    let stats_task = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        let interval = cfg.stats_interval();
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let stats = scheduler.stats();
                info!(
                    hot = stats.hot,
                    overflow = stats.overflow,
                    active = stats.active,
                    "scheduler queue sizes"
                );
            }
        }
    });

    signal::ctrl_c().await?;
    info!("shutdown signal received");

    stats_task.abort();
    scheduler.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();
}
