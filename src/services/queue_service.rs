//! Redis-backed job queue (sec 6 "Persisted state"). Backs the indexing
//! worker pool and the daily retention cron. Jobs are deduplicated by id:
//! re-enqueuing the same id within the dedup window is a no-op.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const QUEUE_KEY: &str = "ragline:queue:jobs";
const DEDUP_TTL_SECS: u64 = 24 * 60 * 60;
const DEQUEUE_TIMEOUT_SECS: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Index { document_id: Uuid },
    CleanRaglog,
    CleanEmbeddings,
}

impl JobPayload {
    fn job_id(&self) -> String {
        match self {
            JobPayload::Index { document_id } => format!("index:{document_id}"),
            JobPayload::CleanRaglog => "clean_raglog:daily".to_string(),
            JobPayload::CleanEmbeddings => "clean_embeddings:daily".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct QueueService {
    redis: redis::aio::ConnectionManager,
}

impl QueueService {
    pub fn new(redis: redis::aio::ConnectionManager) -> Self {
        Self { redis }
    }

    /// Enqueues `job`, discarding the attempt if its job id was already
    /// enqueued within the dedup window (sec 5 "Shared resources").
    pub async fn enqueue(&self, job: JobPayload) -> AppResult<bool> {
        let mut conn = self.redis.clone();
        let dedup_key = format!("ragline:queue:seen:{}", job.job_id());

        let inserted: bool = conn
            .set_nx(&dedup_key, "1")
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("redis set_nx failed: {e}")))?;
        if !inserted {
            return Ok(false);
        }
        let _: () = conn
            .expire(&dedup_key, DEDUP_TTL_SECS as i64)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("redis expire failed: {e}")))?;

        let payload = serde_json::to_string(&job)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("job serialization failed: {e}")))?;
        let _: () = conn
            .lpush(QUEUE_KEY, payload)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("redis lpush failed: {e}")))?;
        Ok(true)
    }

    /// Blocks up to a short timeout for the next job, or returns `None`
    /// if the queue was empty — callers loop on this from a worker task.
    pub async fn dequeue(&self) -> AppResult<Option<JobPayload>> {
        let mut conn = self.redis.clone();
        let result: Option<(String, String)> = conn
            .brpop(QUEUE_KEY, DEQUEUE_TIMEOUT_SECS)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("redis brpop failed: {e}")))?;

        match result {
            Some((_, payload)) => {
                let job = serde_json::from_str(&payload)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed queue payload: {e}")))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_stable_per_document() {
        let id = Uuid::new_v4();
        let a = JobPayload::Index { document_id: id };
        let b = JobPayload::Index { document_id: id };
        assert_eq!(a.job_id(), b.job_id());
    }

    #[test]
    fn retention_jobs_have_fixed_ids() {
        assert_eq!(JobPayload::CleanRaglog.job_id(), JobPayload::CleanRaglog.job_id());
        assert_ne!(JobPayload::CleanRaglog.job_id(), JobPayload::CleanEmbeddings.job_id());
    }
}
