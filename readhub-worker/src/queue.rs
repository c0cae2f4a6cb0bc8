/// Job queue
///
/// Thin wrapper over the `jobs` table used by the orchestrator and by
/// handlers that enqueue follow-up work. Claims are atomic
/// (`FOR UPDATE SKIP LOCKED`), so several worker processes can share one
/// database.
///
/// # Example
///
/// ```no_run
/// use readhub_worker::queue::JobQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let queue = JobQueue::with_batch_size(pool, 4);
///
/// for job in queue.claim(2).await? {
///     println!("Claimed {} job {}", job.kind, job.id);
///     queue.mark_succeeded(&job).await?;
/// }
/// # Ok(())
/// # }
/// ```

use readhub_shared::models::job::{Job, JobKind, JobState};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct JobQueue {
    db: PgPool,

    /// Maximum jobs claimed per poll
    batch_size: usize,
}

impl JobQueue {
    pub fn new(db: PgPool) -> Self {
        Self::with_batch_size(db, 10)
    }

    pub fn with_batch_size(db: PgPool, batch_size: usize) -> Self {
        JobQueue {
            db,
            batch_size: batch_size.max(1),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    /// Claims at most `available` runnable jobs (never more than the batch size)
    pub async fn claim(&self, available: usize) -> Result<Vec<Job>, sqlx::Error> {
        let limit = claim_limit(self.batch_size, available);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let jobs = Job::claim_batch(&self.db, limit).await?;
        if !jobs.is_empty() {
            tracing::debug!(count = jobs.len(), "Claimed jobs");
        }
        Ok(jobs)
    }

    pub async fn enqueue<P: Serialize>(&self, kind: JobKind, payload: &P) -> Result<Job, sqlx::Error> {
        Job::enqueue(&self.db, kind, payload).await
    }

    pub async fn mark_succeeded(&self, job: &Job) -> Result<(), sqlx::Error> {
        if !Job::mark_succeeded(&self.db, job).await? {
            tracing::warn!(job_id = %job.id, "Job was no longer running when it finished");
        }
        Ok(())
    }

    /// Records a failure; the returned state is `pending` when the job
    /// will be retried, `None` when this run no longer owns the job
    pub async fn mark_failed(
        &self,
        job: &Job,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, sqlx::Error> {
        Job::mark_failed(&self.db, job, error, retryable).await
    }

    /// Requeues jobs whose worker disappeared mid-run
    pub async fn recover_stale(&self, timeout_secs: i64) -> Result<u64, sqlx::Error> {
        let recovered = Job::recover_stale(&self.db, timeout_secs).await?;
        if recovered > 0 {
            tracing::warn!(count = recovered, "Recovered stale jobs");
        }
        Ok(recovered)
    }
}

fn claim_limit(batch_size: usize, available: usize) -> i64 {
    i64::try_from(batch_size.min(available)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_limit() {
        assert_eq!(claim_limit(10, 3), 3);
        assert_eq!(claim_limit(4, 16), 4);
        assert_eq!(claim_limit(4, 0), 0);
    }
}
