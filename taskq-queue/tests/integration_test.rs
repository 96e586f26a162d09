//! Integration tests for taskq-queue

use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use taskq_queue::*;
use taskq_redis::{RedisConfig, RedisService};

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

fn fast_workers() -> WorkerConfig {
    WorkerConfig {
        block_timeout: Duration::from_millis(20),
        backoff_initial: Duration::from_millis(5),
        backoff_max: Duration::from_millis(20),
        ..WorkerConfig::default()
    }
}

#[tokio::test]
async fn test_pushed_task_pops_unchanged() {
    let store = MemoryStore::new();
    let task = Task::new("1", "a", json!(null));

    store.push("q", &task).await.unwrap();
    let popped = store.pop("q", None).await.unwrap();

    assert_eq!(popped, Some(task));
}

#[tokio::test]
async fn test_fifo_for_single_producer() {
    let store = MemoryStore::new();
    for id in 0..10 {
        store
            .push("q", &Task::new(id.to_string(), "n", json!(id)))
            .await
            .unwrap();
    }

    for id in 0..10 {
        let task = store.pop("q", Some(Duration::ZERO)).await.unwrap().unwrap();
        assert_eq!(task.id, id.to_string());
    }
}

#[tokio::test]
async fn test_delayed_task_visible_only_after_promotion() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let scheduler = Scheduler::new(store.clone(), ["q"], SchedulerConfig::default());
    let task = Task::new("2", "b", json!(null));

    store.schedule("q", &task, Duration::from_millis(100)).await.unwrap();

    assert_eq!(scheduler.tick().await, 0);
    let early = store.pop("q", Some(Duration::from_millis(10))).await.unwrap();
    assert!(early.is_none());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(scheduler.tick().await, 1);

    let popped = store.pop("q", Some(Duration::ZERO)).await.unwrap();
    assert_eq!(popped, Some(task));
}

#[tokio::test]
async fn test_concurrent_promotion_delivers_once() {
    let store = Arc::new(MemoryStore::new());
    for id in 0..200 {
        store
            .schedule("q", &Task::new(id.to_string(), "n", json!(null)), Duration::ZERO)
            .await
            .unwrap();
    }

    let promoters: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.promote_due("q").await.unwrap() })
        })
        .collect();

    let mut promoted = 0;
    for promoter in promoters {
        promoted += promoter.await.unwrap();
    }

    assert_eq!(promoted, 200);
    assert_eq!(store.len("q").await.unwrap(), 200);
    assert_eq!(store.scheduled_len("q").await.unwrap(), 0);

    let mut seen = BTreeSet::new();
    while let Some(task) = store.pop("q", Some(Duration::ZERO)).await.unwrap() {
        assert!(seen.insert(task.id));
    }
    assert_eq!(seen.len(), 200);
}

#[tokio::test]
async fn test_two_consumers_split_tasks() {
    let store = Arc::new(MemoryStore::new());
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut pool = WorkerPool::new(store.clone(), fast_workers());
    let sink = received.clone();
    pool.register_with_consumers("q", 2, move |task| {
        let sink = sink.clone();
        async move {
            sink.lock().push(task.id);
            Ok(())
        }
    });
    pool.start().unwrap();

    let producer = Producer::new(store.clone());
    for id in ["1", "2", "3"] {
        producer.enqueue("q", &Task::new(id, "a", json!(null))).await.unwrap();
    }

    wait_until(|| {
        let received = received.clone();
        async move { received.lock().len() == 3 }
    })
    .await;
    pool.stop().await.unwrap();

    let mut ids = received.lock().clone();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_failed_task_is_lost() {
    let store = Arc::new(MemoryStore::new());
    let mut pool = WorkerPool::new(store.clone(), fast_workers());
    pool.register("q", |_task| async { Err(QueueError::execution("handler failed")) });
    pool.start().unwrap();

    store.push("q", &Task::new("doomed", "a", json!(null))).await.unwrap();

    wait_until(|| {
        let failed = pool.stats().failed;
        async move { failed == 1 }
    })
    .await;
    pool.stop().await.unwrap();

    assert_eq!(store.len("q").await.unwrap(), 0);
    assert_eq!(store.scheduled_len("q").await.unwrap(), 0);
    assert_eq!(pool.stats().retried, 0);
}

#[tokio::test]
async fn test_retry_policy_redelivers_with_incremented_counter() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let attempts: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

    let config = WorkerConfig {
        retry: RetryPolicy::exponential(2, Duration::from_millis(10)),
        ..fast_workers()
    };
    let mut pool = WorkerPool::new(store.clone(), config);
    let seen = attempts.clone();
    pool.register("q", move |task| {
        let seen = seen.clone();
        async move {
            seen.lock().push(task.retry);
            Err(QueueError::execution("always fails"))
        }
    });
    pool.start().unwrap();

    let mut scheduler = Scheduler::new(
        store.clone(),
        ["q"],
        SchedulerConfig {
            tick_interval: Duration::from_millis(10),
        },
    );
    scheduler.start().unwrap();

    store.push("q", &Task::new("r", "a", json!(null))).await.unwrap();

    wait_until(|| {
        let count = attempts.lock().len();
        async move { count == 3 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    scheduler.stop().await.unwrap();
    pool.stop().await.unwrap();

    assert_eq!(*attempts.lock(), vec![0, 1, 2]);
    assert_eq!(pool.stats().retried, 2);
    assert_eq!(store.scheduled_len("q").await.unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_task() {
    let store = Arc::new(MemoryStore::new());
    let finished = Arc::new(Mutex::new(false));

    let mut pool = WorkerPool::new(store.clone(), fast_workers());
    let flag = finished.clone();
    pool.register("q", move |_task| {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            *flag.lock() = true;
            Ok(())
        }
    });
    pool.start().unwrap();

    store.push("q", &Task::new("1", "a", json!(null))).await.unwrap();
    wait_until(|| {
        let processing = pool
            .consumer_states()
            .iter()
            .any(|(_, _, state)| *state == ConsumerState::Processing);
        async move { processing }
    })
    .await;

    pool.stop().await.unwrap();
    assert!(*finished.lock());
    assert_eq!(pool.stats().processed, 1);
}

// The tests below need a Redis server on localhost:6379.
// They are disabled by default but can be run with: cargo test -- --ignored

fn test_redis_config() -> RedisConfig {
    RedisConfig::builder()
        .addr("localhost:6379")
        .db(15)
        .pool_size(4)
        .build()
}

async fn redis_store() -> RedisStore {
    RedisStore::open(RedisStoreConfig::new(test_redis_config()))
        .await
        .expect("Redis server on localhost:6379")
}

/// Plain command connection for writing entries the store would never write.
async fn raw_connection() -> redis::aio::ConnectionManager {
    RedisService::open(test_redis_config())
        .await
        .expect("Redis server on localhost:6379")
        .connection()
}

fn unique_queue(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore]
async fn test_redis_push_pop_round_trip() {
    let store = redis_store().await;
    let queue = unique_queue("roundtrip");
    let first = Task::new("1", "a", json!(null));
    let second = Task::new("2", "b", json!({"k": [1, 2]}));

    store.push(&queue, &first).await.unwrap();
    store.push(&queue, &second).await.unwrap();

    assert_eq!(store.len(&queue).await.unwrap(), 2);
    assert_eq!(store.pop(&queue, None).await.unwrap(), Some(first));
    assert_eq!(store.pop(&queue, Some(Duration::ZERO)).await.unwrap(), Some(second));
    assert!(store.pop(&queue, Some(Duration::from_millis(100))).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_redis_delayed_promotion() {
    let store: Arc<dyn Store> = Arc::new(redis_store().await);
    let queue = unique_queue("delayed");
    let task = Task::new("2", "b", json!(null));

    store.schedule(&queue, &task, Duration::from_millis(200)).await.unwrap();
    assert_eq!(store.promote_due(&queue).await.unwrap(), 0);
    assert_eq!(store.scheduled_len(&queue).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.promote_due(&queue).await.unwrap(), 1);
    assert_eq!(store.pop(&queue, Some(Duration::ZERO)).await.unwrap(), Some(task));
}

#[tokio::test]
#[ignore]
async fn test_redis_concurrent_promotion_delivers_once() {
    let store = Arc::new(redis_store().await);
    let queue = unique_queue("race");
    for id in 0..250 {
        store
            .schedule(&queue, &Task::new(id.to_string(), "n", json!(null)), Duration::ZERO)
            .await
            .unwrap();
    }

    let promoters: Vec<_> = (0..3)
        .map(|_| {
            let store = store.clone();
            let queue = queue.clone();
            tokio::spawn(async move { store.promote_due(&queue).await.unwrap() })
        })
        .collect();

    let mut promoted = 0;
    for promoter in promoters {
        promoted += promoter.await.unwrap();
    }

    assert_eq!(promoted, 250);
    assert_eq!(store.len(&queue).await.unwrap(), 250);
    assert_eq!(store.scheduled_len(&queue).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_redis_promotion_into_unwritable_queue_keeps_entry_scheduled() {
    let store = RedisStore::open(RedisStoreConfig::new(test_redis_config()).with_promote_batch_size(1))
        .await
        .unwrap();
    let queue = unique_queue("wrongtype");
    let mut conn = raw_connection().await;
    redis::cmd("SET")
        .arg(&queue)
        .arg("not a list")
        .query_async::<()>(&mut conn)
        .await
        .unwrap();

    let task = Task::new("stuck", "n", json!(null));
    store.schedule(&queue, &task, Duration::ZERO).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), store.promote_due(&queue))
        .await
        .expect("promotion returns instead of retrying forever");
    assert!(matches!(result, Err(QueueError::Transport(_))));
    assert_eq!(store.scheduled_len(&queue).await.unwrap(), 1);

    // Once the key is usable again the same entry goes through.
    redis::cmd("DEL").arg(&queue).query_async::<()>(&mut conn).await.unwrap();
    assert_eq!(store.promote_due(&queue).await.unwrap(), 1);
    assert_eq!(store.pop(&queue, Some(Duration::ZERO)).await.unwrap(), Some(task));
}

#[tokio::test]
#[ignore]
async fn test_redis_promotion_skips_malformed_entries() {
    let store = redis_store().await;
    let queue = unique_queue("malformed");
    let mut conn = raw_connection().await;
    for garbage in ["garbage", "{\"id\": 7}", "[1, 2]"] {
        redis::cmd("ZADD")
            .arg(scheduled_key(&queue))
            .arg(0)
            .arg(garbage)
            .query_async::<()>(&mut conn)
            .await
            .unwrap();
    }

    let task = Task::new("valid", "n", json!({"k": 1}));
    store.schedule(&queue, &task, Duration::ZERO).await.unwrap();

    assert_eq!(store.promote_due(&queue).await.unwrap(), 1);
    assert_eq!(store.scheduled_len(&queue).await.unwrap(), 0);
    assert_eq!(store.len(&queue).await.unwrap(), 1);
    assert_eq!(store.pop(&queue, Some(Duration::ZERO)).await.unwrap(), Some(task));
}
