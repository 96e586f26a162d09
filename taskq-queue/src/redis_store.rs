//! Store implementation with Redis backend.
//!
//! Live queues are lists (`LPUSH` to enqueue, `BRPOP` to dequeue) and
//! scheduled sets are sorted sets scored by eligibility time in Unix
//! milliseconds.

use crate::error::{QueueError, QueueResult};
use crate::store::{Store, eligible_at, now_millis, scheduled_key};
use crate::task::Task;
use async_trait::async_trait;
use redis::Script;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use taskq_redis::{PoolStats, RedisConfig, RedisService};
use tracing::{debug, info, warn};

/// Moves up to `ARGV[2]` entries of `KEYS[1]` scored at most `ARGV[1]` onto
/// the list `KEYS[2]` and returns `{moved, skipped}`.
///
/// Entries that do not decode as a task are removed without being pushed.
/// Each entry leaves the set only after its push succeeded, so a failing push
/// aborts the script with that entry still scheduled.
const MOVE_DUE: &str = r#"
local function is_task(raw)
    local ok, task = pcall(cjson.decode, raw)
    if not ok or type(task) ~= 'table' then
        return false
    end
    if type(task.id) ~= 'string' or type(task.name) ~= 'string' then
        return false
    end
    local retry = task.retry
    return retry == nil
        or (type(retry) == 'number' and retry >= 0 and retry % 1 == 0 and retry <= 4294967295)
end

local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
local moved, skipped = 0, 0
for _, raw in ipairs(due) do
    if is_task(raw) then
        local pushed = redis.pcall('LPUSH', KEYS[2], raw)
        if type(pushed) == 'table' and pushed.err then
            return redis.error_reply(pushed.err)
        end
        moved = moved + 1
    else
        skipped = skipped + 1
    end
    redis.call('ZREM', KEYS[1], raw)
end
return {moved, skipped}
"#;

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Connection settings
    pub redis: RedisConfig,

    /// Maximum entries moved per promotion round trip
    pub promote_batch_size: usize,
}

impl RedisStoreConfig {
    /// Create a store configuration.
    pub fn new(redis: RedisConfig) -> Self {
        Self {
            redis,
            promote_batch_size: 100,
        }
    }

    /// Set the promotion batch size.
    pub fn with_promote_batch_size(mut self, size: usize) -> Self {
        self.promote_batch_size = size.max(1);
        self
    }
}

/// Task store backed by Redis.
pub struct RedisStore {
    redis: RedisService,
    move_due: Script,
    promote_batch_size: usize,
    closed: AtomicBool,
}

impl RedisStore {
    /// Open a store from connection settings.
    pub async fn open(config: RedisStoreConfig) -> QueueResult<Self> {
        info!(addr = %config.redis.addr, db = config.redis.db, "Opening Redis task store");
        let redis = RedisService::open(config.redis).await?;
        Ok(Self::with_service(redis, config.promote_batch_size))
    }

    /// Build a store on an already opened service.
    pub fn with_service(redis: RedisService, promote_batch_size: usize) -> Self {
        Self {
            redis,
            move_due: Script::new(MOVE_DUE),
            promote_batch_size: promote_batch_size.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Connection counts of the pool used for blocking pops.
    pub fn pool_stats(&self) -> PoolStats {
        self.redis.pool_stats()
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Transport("store is closed".to_string()));
        }
        Ok(())
    }

    async fn push_raw(&self, queue: &str, raw: &str) -> QueueResult<()> {
        let mut conn = self.redis.connection();
        redis::cmd("LPUSH")
            .arg(queue)
            .arg(raw)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn push(&self, queue: &str, task: &Task) -> QueueResult<()> {
        self.ensure_open()?;
        let raw = task.encode()?;
        self.push_raw(queue, &raw).await?;
        debug!(queue = %queue, task_id = %task.id, "Task pushed");
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Option<Duration>) -> QueueResult<Option<Task>> {
        self.ensure_open()?;

        let raw: Option<String> = match timeout {
            Some(timeout) if timeout < Duration::from_millis(1) => {
                let mut conn = self.redis.connection();
                redis::cmd("RPOP").arg(queue).query_async(&mut conn).await?
            }
            timeout => {
                // BRPOP treats 0 as "wait forever".
                let seconds = timeout.map_or(0.0, |t| t.as_secs_f64());
                let mut conn = self.redis.blocking().await?;
                let reply: Option<(String, String)> = redis::cmd("BRPOP")
                    .arg(queue)
                    .arg(seconds)
                    .query_async(&mut *conn)
                    .await?;
                reply.map(|(_, raw)| raw)
            }
        };

        match raw {
            Some(raw) => Task::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn schedule(&self, queue: &str, task: &Task, delay: Duration) -> QueueResult<()> {
        self.ensure_open()?;
        let raw = task.encode()?;
        let at = eligible_at(delay);

        let mut conn = self.redis.connection();
        redis::cmd("ZADD")
            .arg(scheduled_key(queue))
            .arg(at)
            .arg(&raw)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(queue = %queue, task_id = %task.id, eligible_at = at, "Task scheduled");
        Ok(())
    }

    async fn promote_due(&self, queue: &str) -> QueueResult<usize> {
        self.ensure_open()?;
        let key = scheduled_key(queue);
        let now = now_millis();
        let mut conn = self.redis.connection();

        // Entries that become due while this runs wait for the next tick.
        let due: usize = redis::cmd("ZCOUNT")
            .arg(&key)
            .arg("-inf")
            .arg(now)
            .query_async(&mut conn)
            .await?;
        let passes = due.div_ceil(self.promote_batch_size);

        let mut promoted = 0;
        let mut skipped = 0;
        for _ in 0..passes {
            let (moved, dropped): (usize, usize) = self
                .move_due
                .key(&key)
                .key(queue)
                .arg(now)
                .arg(self.promote_batch_size)
                .invoke_async(&mut conn)
                .await?;

            promoted += moved;
            skipped += dropped;
            if moved + dropped < self.promote_batch_size {
                break;
            }
        }

        if skipped > 0 {
            warn!(queue = %queue, skipped, "Dropped malformed scheduled entries");
        }
        if promoted > 0 {
            debug!(queue = %queue, promoted, "Promoted scheduled tasks");
        }
        Ok(promoted)
    }

    async fn len(&self, queue: &str) -> QueueResult<usize> {
        self.ensure_open()?;
        let mut conn = self.redis.connection();
        let len: usize = redis::cmd("LLEN").arg(queue).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn scheduled_len(&self, queue: &str) -> QueueResult<usize> {
        self.ensure_open()?;
        let mut conn = self.redis.connection();
        let len: usize = redis::cmd("ZCARD")
            .arg(scheduled_key(queue))
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn close(&self) -> QueueResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(addr = %self.redis.config().addr, "Redis task store closed");
        }
        Ok(())
    }
}
