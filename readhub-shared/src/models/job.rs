/// Background job queue table
///
/// The API enqueues jobs; workers claim them with `FOR UPDATE SKIP LOCKED`
/// so several workers can poll the same table without double-processing.
///
/// # State machine
///
/// ```text
/// pending ──claim──> running ──ok──> succeeded
///    ▲                  │
///    └──retry (backoff)─┤ error, attempts < max_attempts
///                       └──────────> failed
/// ```
///
/// # Example
///
/// ```no_run
/// use readhub_shared::models::job::{EmbedPayload, Job, JobKind};
/// use readhub_shared::domain::BookId;
/// # async fn example(pool: sqlx::PgPool, book_id: BookId) -> Result<(), sqlx::Error> {
/// let job = Job::enqueue(&pool, JobKind::Embed, &EmbedPayload { book_id }).await?;
/// let claimed = Job::claim_batch(&pool, 10).await?;
/// # Ok(())
/// # }
/// ```

use crate::domain::{BookId, JobId, TtsId, UserId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;

/// Attempts before a job is marked failed
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Error recorded on jobs whose worker disappeared mid-run
pub const STALE_JOB_ERROR: &str = "Worker stopped before finishing the job";

const JOB_COLUMNS: &str = "id, kind, payload, state, attempts, max_attempts, error, run_after, \
     created_at, started_at, finished_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Tts,
    Scrape,
    Embed,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Tts => "tts",
            JobKind::Scrape => "scrape",
            JobKind::Embed => "embed",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Payload of a `tts` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsPayload {
    pub tts_id: TtsId,
}

/// Payload of a `scrape` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapePayload {
    pub book_id: BookId,
    pub url: String,
    /// Next free number when absent
    pub chapter_number: Option<i32>,
    /// Overrides the scraped title
    pub title: Option<String>,
    pub requested_by: Option<UserId>,
}

/// Payload of an `embed` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedPayload {
    pub book_id: BookId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: Json<serde_json::Value>,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error: Option<String>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Seconds to wait before retrying after `attempts` failures
pub fn retry_backoff_secs(attempts: i32) -> i64 {
    let n = i64::from(attempts.clamp(1, 10));
    (n * n * 10).min(3600)
}

impl Job {
    /// Decodes the payload into its typed form
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.0.clone())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded | JobState::Failed)
    }

    /// Whether a failure of this run puts the job back in the queue
    pub fn will_retry(&self, retryable: bool) -> bool {
        retryable && self.attempts < self.max_attempts
    }

    /// Adds a pending job runnable immediately
    pub async fn enqueue<P: Serialize>(
        pool: &PgPool,
        kind: JobKind,
        payload: &P,
    ) -> Result<Self, sqlx::Error> {
        let payload = serde_json::to_value(payload).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (kind, payload, max_attempts)
            VALUES ($1, $2, $3)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(kind)
        .bind(Json(payload))
        .bind(DEFAULT_MAX_ATTEMPTS)
        .fetch_one(pool)
        .await?;

        tracing::debug!(job_id = %job.id, kind = %kind, "Job enqueued");
        Ok(job)
    }

    pub async fn find(pool: &PgPool, id: JobId) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claims up to `limit` runnable jobs, oldest first
    ///
    /// Claimed rows move to `running` with `attempts` incremented. Rows
    /// locked by another worker are skipped rather than waited on.
    pub async fn claim_batch(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET state = 'running', attempts = attempts + 1,
                started_at = NOW(), updated_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE state = 'pending' AND run_after <= NOW()
                ORDER BY run_after, created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Finishes a claimed run; `false` when the claim was lost (the job was
    /// recovered as stale and possibly claimed again)
    pub async fn mark_succeeded(pool: &PgPool, job: &Job) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'succeeded', error = NULL, finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND state = 'running' AND started_at IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(job.id)
        .bind(job.started_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a failure of a claimed run: back to `pending` with backoff
    /// when [`Job::will_retry`], otherwise `failed`
    ///
    /// Returns `None` when the claim was lost.
    pub async fn mark_failed(
        pool: &PgPool,
        job: &Job,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, sqlx::Error> {
        let state = if job.will_retry(retryable) {
            JobState::Pending
        } else {
            JobState::Failed
        };

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = $2,
                error = $3,
                run_after = CASE WHEN $2 = 'pending'::job_state
                                 THEN NOW() + make_interval(secs => $4)
                                 ELSE run_after END,
                finished_at = CASE WHEN $2 = 'failed'::job_state THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1 AND state = 'running' AND started_at IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(job.id)
        .bind(state)
        .bind(error)
        .bind(retry_backoff_secs(job.attempts) as f64)
        .bind(job.started_at)
        .execute(pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(state))
    }

    /// Puts jobs stuck in `running` for longer than `timeout_secs` back to
    /// `pending` (their worker died), or fails them when no attempts are
    /// left; returns how many
    ///
    /// Text-to-speech records of recovered `tts` jobs follow their job:
    /// `pending` again, or `failed` with the job.
    pub async fn recover_stale(pool: &PgPool, timeout_secs: i64) -> Result<u64, sqlx::Error> {
        let recovered: i64 = sqlx::query_scalar(
            r#"
            WITH recovered AS (
                UPDATE jobs
                SET state = CASE WHEN attempts < max_attempts
                                 THEN 'pending'::job_state ELSE 'failed'::job_state END,
                    error = $2,
                    finished_at = CASE WHEN attempts < max_attempts THEN NULL ELSE NOW() END,
                    updated_at = NOW()
                WHERE state = 'running'
                  AND started_at < NOW() - make_interval(secs => $1)
                RETURNING kind, state, payload
            ),
            speech AS (
                UPDATE text_to_speech t
                SET status = CASE WHEN r.state = 'failed'::job_state
                                  THEN 'failed'::tts_status ELSE 'pending'::tts_status END,
                    error = $2,
                    updated_at = NOW()
                FROM recovered r
                WHERE r.kind = 'tts'
                  AND t.id::text = r.payload->>'tts_id'
                  AND t.status <> 'completed'
                RETURNING t.id
            )
            SELECT COUNT(*) FROM recovered
            "#,
        )
        .bind(timeout_secs as f64)
        .bind(STALE_JOB_ERROR)
        .fetch_one(pool)
        .await?;

        Ok(recovered.unsigned_abs())
    }

    /// Newest first, optionally filtered by state
    pub async fn list(
        pool: &PgPool,
        state: Option<JobState>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE ($1::job_state IS NULL OR state = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(state)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool, state: Option<JobState>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE ($1::job_state IS NULL OR state = $1)")
            .bind(state)
            .fetch_one(pool)
            .await
    }

    pub async fn counts_by_state(pool: &PgPool) -> Result<Vec<(JobState, i64)>, sqlx::Error> {
        sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state ORDER BY state")
            .fetch_all(pool)
            .await
    }
}
