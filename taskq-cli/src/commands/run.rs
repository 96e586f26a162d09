use crate::ingress::{self, IngressState};
use anyhow::Context;
use taskq_config::AppConfig;
use taskq_queue::{Producer, QueueResult, Scheduler, Task, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct RunOptions {
    pub listen: Option<String>,
    pub no_http: bool,
}

/// Default processing: record the task and succeed.
async fn log_task(task: Task) -> QueueResult<()> {
    info!(
        task_id = %task.id,
        task_name = %task.name,
        retry = task.retry,
        payload = %task.payload,
        "Processing task"
    );
    Ok(())
}

pub async fn execute(config: &AppConfig, options: RunOptions) -> anyhow::Result<()> {
    let store = super::open_store(config).await?;
    let queues = config.queue_names();

    let mut scheduler = Scheduler::new(store.clone(), queues.clone(), config.scheduler_config());
    scheduler.start()?;

    let mut workers = WorkerPool::new(store.clone(), config.worker_config());
    for task in &config.tasks {
        workers.register_with_consumers(task.queue_name.clone(), task.consumers, log_task);
    }
    workers.start()?;

    let shutdown = CancellationToken::new();
    let server = if options.no_http {
        None
    } else {
        let listen = options.listen.unwrap_or_else(|| config.http.listen.clone());
        let listener = tokio::net::TcpListener::bind(&listen)
            .await
            .with_context(|| format!("failed to bind {}", listen))?;
        info!(listen = %listen, "HTTP ingress listening");

        let state = IngressState::new(
            Producer::new(store.clone()),
            queues,
            config.http.default_queue.clone(),
        );
        let app = ingress::router(state);
        let stopped = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stopped.cancelled_owned())
                .await
        }))
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    shutdown.cancel();
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "HTTP ingress failed"),
            Err(e) => error!(error = %e, "HTTP ingress task panicked"),
        }
    }

    workers.stop().await?;
    scheduler.stop().await?;
    store.close().await?;

    info!(stats = ?workers.stats(), "Shutdown complete");
    Ok(())
}
