//! Redis implementation of [`JobBroker`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::Script;
use uuid::Uuid;

use rankpulse_core::result::AppResult;
use rankpulse_core::traits::broker::JobBroker;
use rankpulse_core::types::job::{JobRecord, JobState, QueueCounts};

use super::client::{RedisClient, map_redis_err};

/// Moves due delayed ids to the wait list. `ZREM` inside the script makes
/// the move atomic across every connected worker.
const PROMOTE_DUE: &str = r"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('LPUSH', KEYS[2], id)
end
return #ids
";

/// Moves one id from active back to wait, only if it is still active.
const REQUEUE_ONE: &str = r"
if redis.call('LREM', KEYS[1], 1, ARGV[1]) > 0 then
  redis.call('LPUSH', KEYS[2], ARGV[1])
  return 1
end
return 0
";

/// How many delayed jobs a single claim promotes.
const PROMOTE_BATCH: u32 = 100;

/// Terminally failed records are kept this long for inspection.
const FAILED_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// Failed-list entries kept per queue.
const FAILED_LIST_LIMIT: i64 = 1000;

/// Redis-backed job broker.
#[derive(Debug, Clone)]
pub struct RedisBroker {
    client: RedisClient,
}

impl RedisBroker {
    /// Create a broker over a client.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    async fn promote_due(&self, queue: &str) -> AppResult<u64> {
        let keys = self.client.keys();
        let mut conn = self.client.conn().await?;
        let promoted: u64 = Script::new(PROMOTE_DUE)
            .key(keys.delayed(queue))
            .key(keys.wait(queue))
            .arg(Utc::now().timestamp_millis())
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        if promoted > 0 {
            tracing::debug!(queue, promoted, "Promoted delayed jobs");
        }
        Ok(promoted)
    }

    async fn load(&self, job_id: &str) -> AppResult<Option<JobRecord>> {
        let Ok(id) = Uuid::parse_str(job_id) else {
            return Ok(None);
        };

        let mut conn = self.client.conn().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.client.keys().job(id))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JobBroker for RedisBroker {
    async fn push(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let keys = self.client.keys();
        let mut record = job.clone();
        record.state = if ready_at.is_some() {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        let json = serde_json::to_string(&record)?;
        let id = record.id.to_string();

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("SET").arg(keys.job(record.id)).arg(json).ignore();
        match ready_at {
            Some(at) => pipe
                .cmd("ZADD")
                .arg(keys.delayed(queue))
                .arg(at.timestamp_millis())
                .arg(&id)
                .ignore(),
            None => pipe.cmd("LPUSH").arg(keys.wait(queue)).arg(&id).ignore(),
        };

        let mut conn = self.client.conn().await?;
        let _: () = pipe.query_async(&mut conn).await.map_err(map_redis_err)?;
        Ok(())
    }

    async fn claim(&self, queue: &str, wait: Duration) -> AppResult<Option<JobRecord>> {
        self.promote_due(queue).await?;

        let keys = self.client.keys();
        let blocking = self.client.blocking_conn(queue).await?;
        let moved: Option<String> = {
            let mut conn = blocking.lock().await;
            let result = redis::cmd("BLMOVE")
                .arg(keys.wait(queue))
                .arg(keys.active(queue))
                .arg("RIGHT")
                .arg("LEFT")
                .arg(wait.as_secs_f64())
                .query_async(&mut *conn)
                .await;
            match result {
                Ok(moved) => moved,
                Err(e) => {
                    drop(conn);
                    self.client.drop_blocking_conn(queue).await;
                    return Err(map_redis_err(e));
                }
            }
        };

        let Some(id) = moved else {
            return Ok(None);
        };

        let Some(mut record) = self.load(&id).await? else {
            tracing::warn!(queue, job_id = %id, "Claimed job has no record, dropping");
            let mut conn = self.client.conn().await?;
            let _: i64 = redis::cmd("LREM")
                .arg(keys.active(queue))
                .arg(1)
                .arg(&id)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_err)?;
            return Ok(None);
        };

        record.state = JobState::Active;
        record.claimed_at = Some(Utc::now());
        let json = serde_json::to_string(&record)?;

        let mut conn = self.client.conn().await?;
        let _: () = redis::cmd("SET")
            .arg(keys.job(record.id))
            .arg(json)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        Ok(Some(record))
    }

    async fn ack(&self, queue: &str, job_id: Uuid) -> AppResult<()> {
        let keys = self.client.keys();
        let mut conn = self.client.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(keys.active(queue))
            .arg(1)
            .arg(job_id.to_string())
            .ignore()
            .cmd("DEL")
            .arg(keys.job(job_id))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn release(
        &self,
        queue: &str,
        job: &JobRecord,
        ready_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let keys = self.client.keys();
        let mut record = job.clone();
        record.state = JobState::Delayed;
        let json = serde_json::to_string(&record)?;
        let id = record.id.to_string();

        let mut conn = self.client.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(keys.active(queue))
            .arg(1)
            .arg(&id)
            .ignore()
            .cmd("SET")
            .arg(keys.job(record.id))
            .arg(json)
            .ignore()
            .cmd("ZADD")
            .arg(keys.delayed(queue))
            .arg(ready_at.timestamp_millis())
            .arg(&id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn bury(&self, queue: &str, job: &JobRecord) -> AppResult<()> {
        let keys = self.client.keys();
        let mut record = job.clone();
        record.state = JobState::Failed;
        let json = serde_json::to_string(&record)?;
        let id = record.id.to_string();

        let mut conn = self.client.conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(keys.active(queue))
            .arg(1)
            .arg(&id)
            .ignore()
            .cmd("SET")
            .arg(keys.job(record.id))
            .arg(json)
            .arg("EX")
            .arg(FAILED_RETENTION_SECS)
            .ignore()
            .cmd("LPUSH")
            .arg(keys.failed(queue))
            .arg(&id)
            .ignore()
            .cmd("LTRIM")
            .arg(keys.failed(queue))
            .arg(0)
            .arg(FAILED_LIST_LIMIT - 1)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn requeue_stalled(&self, queue: &str, claimed_before: DateTime<Utc>) -> AppResult<u64> {
        let keys = self.client.keys();
        let mut conn = self.client.conn().await?;
        let active: Vec<String> = redis::cmd("LRANGE")
            .arg(keys.active(queue))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        let script = Script::new(REQUEUE_ONE);
        let mut requeued = 0u64;
        for id in active {
            let stalled = match self.load(&id).await? {
                Some(record) => record.claimed_at.is_none_or(|at| at < claimed_before),
                None => true,
            };
            if !stalled {
                continue;
            }

            let moved: u64 = script
                .key(keys.active(queue))
                .key(keys.wait(queue))
                .arg(&id)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis_err)?;
            requeued += moved;
        }

        Ok(requeued)
    }

    async fn counts(&self, queue: &str) -> AppResult<QueueCounts> {
        let keys = self.client.keys();
        let mut conn = self.client.conn().await?;
        let (waiting, delayed, active, failed): (u64, u64, u64, u64) = redis::pipe()
            .cmd("LLEN")
            .arg(keys.wait(queue))
            .cmd("ZCARD")
            .arg(keys.delayed(queue))
            .cmd("LLEN")
            .arg(keys.active(queue))
            .cmd("LLEN")
            .arg(keys.failed(queue))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        Ok(QueueCounts {
            waiting,
            delayed,
            active,
            failed,
        })
    }

    async fn ping(&self) -> AppResult<bool> {
        let mut conn = self.client.conn().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(pong == "PONG")
    }
}
