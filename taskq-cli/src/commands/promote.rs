use taskq_config::AppConfig;
use taskq_queue::Scheduler;

/// Run a single promotion pass, e.g. from an external cron.
pub async fn execute(config: &AppConfig) -> anyhow::Result<()> {
    let store = super::open_store(config).await?;
    let scheduler = Scheduler::new(store.clone(), config.queue_names(), config.scheduler_config());

    let promoted = scheduler.tick().await;
    store.close().await?;

    println!("Promoted {} task(s)", promoted);
    Ok(())
}
