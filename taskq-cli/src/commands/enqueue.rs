use anyhow::{Context, bail};
use std::time::Duration;
use taskq_config::AppConfig;
use taskq_queue::{Payload, Producer, Task};

pub struct EnqueueOptions {
    pub queue: String,
    pub name: String,
    pub id: Option<String>,
    pub payload: Option<String>,
    pub retry: u32,
    pub delay_secs: u64,
}

/// Build the task described on the command line.
pub fn build_task(options: &EnqueueOptions) -> anyhow::Result<Task> {
    let payload: Payload = match &options.payload {
        Some(raw) => serde_json::from_str(raw).context("payload is not valid JSON")?,
        None => Payload::Null,
    };

    let task = match &options.id {
        Some(id) => Task::new(id.clone(), options.name.clone(), payload),
        None => Task::with_random_id(options.name.clone(), payload),
    };
    Ok(task.with_retry(options.retry))
}

pub async fn execute(config: &AppConfig, options: EnqueueOptions) -> anyhow::Result<()> {
    if !config.has_queue(&options.queue) {
        bail!("queue '{}' is not configured", options.queue);
    }

    let task = build_task(&options)?;
    let store = super::open_store(config).await?;
    let producer = Producer::new(store.clone());

    producer
        .enqueue_delayed(&options.queue, &task, Duration::from_secs(options.delay_secs))
        .await
        .context("failed to enqueue task")?;
    store.close().await?;

    if options.delay_secs > 0 {
        println!(
            "Scheduled task {} on {} in {}s",
            task.id, options.queue, options.delay_secs
        );
    } else {
        println!("Enqueued task {} on {}", task.id, options.queue);
    }
    Ok(())
}
