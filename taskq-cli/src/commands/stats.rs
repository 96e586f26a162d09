use anyhow::Context;
use taskq_config::AppConfig;
use taskq_queue::{RedisStore, Store};

pub async fn execute(config: &AppConfig) -> anyhow::Result<()> {
    let store = RedisStore::open(config.store_config())
        .await
        .with_context(|| format!("failed to connect to Redis at {}", config.redis.addr))?;

    println!("{:<32} {:>10} {:>10}", "QUEUE", "READY", "SCHEDULED");
    for queue in config.queue_names() {
        let ready = store.len(&queue).await?;
        let scheduled = store.scheduled_len(&queue).await?;
        println!("{:<32} {:>10} {:>10}", queue, ready, scheduled);
    }

    let pool = store.pool_stats();
    println!();
    println!(
        "blocking connections: {} ({} idle)",
        pool.connections, pool.idle_connections
    );

    store.close().await?;
    Ok(())
}
