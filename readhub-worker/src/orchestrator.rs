/// Worker orchestrator
///
/// The orchestrator is the main worker loop: it claims jobs from the queue,
/// dispatches each to the handler registered for its kind and records the
/// outcome.
///
/// # Architecture
///
/// ```text
/// ┌──────────────────────────────────────────┐
/// │          Worker Orchestrator             │
/// │                                          │
/// │  ┌──────────┐      ┌─────────────────┐   │
/// │  │ JobQueue │─────>│ Handler Registry│   │
/// │  └──────────┘      └─────────────────┘   │
/// │       │                     │            │
/// │       │  claim (SKIP LOCKED)│ tts/scrape/embed
/// │       ▼                     ▼            │
/// │  ┌──────────────────────────────────┐    │
/// │  │  Spawned jobs (≤ max_concurrent) │    │
/// │  └──────────────────────────────────┘    │
/// └──────────────────────────────────────────┘
/// ```
///
/// # Concurrency
///
/// A semaphore with `max_concurrent_jobs` permits bounds in-flight jobs; the
/// loop never claims more jobs than free permits, so claimed jobs start
/// immediately instead of waiting in memory.
///
/// # Shutdown
///
/// Cancelling the token returned by [`WorkerOrchestrator::shutdown_token`]
/// stops claiming. Running jobs get `shutdown_timeout_secs` to finish; any
/// still running afterwards are picked up again by stale-job recovery.
///
/// # Example
///
/// ```no_run
/// use readhub_worker::handlers::HandlerRegistry;
/// use readhub_worker::orchestrator::{OrchestratorConfig, WorkerOrchestrator};
/// use readhub_worker::queue::JobQueue;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> anyhow::Result<()> {
/// let orchestrator = WorkerOrchestrator::new(
///     JobQueue::new(pool),
///     HandlerRegistry::new(),
///     OrchestratorConfig::default(),
/// );
///
/// let shutdown = orchestrator.shutdown_token();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.cancel();
/// });
///
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::handlers::HandlerRegistry;
use crate::queue::JobQueue;
use readhub_shared::models::job::{Job, JobState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Seconds between polls when the queue is empty
    pub poll_interval_secs: u64,

    /// Jobs running at once
    pub max_concurrent_jobs: usize,

    /// Jobs claimed per poll
    pub batch_size: usize,

    /// Running jobs older than this are considered abandoned
    pub stale_after_secs: i64,

    /// Grace period for running jobs on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            max_concurrent_jobs: 4,
            batch_size: 4,
            stale_after_secs: 600,
            shutdown_timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    /// How often abandoned jobs are swept back into the queue
    fn recovery_interval(&self) -> Duration {
        Duration::from_secs((self.stale_after_secs.max(2) / 2).unsigned_abs())
    }
}

pub struct WorkerOrchestrator {
    queue: JobQueue,
    handlers: Arc<HandlerRegistry>,
    config: OrchestratorConfig,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl WorkerOrchestrator {
    pub fn new(queue: JobQueue, handlers: HandlerRegistry, config: OrchestratorConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            queue,
            handlers: Arc::new(handlers),
            config,
            slots,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Jobs currently executing
    pub fn active_jobs(&self) -> usize {
        self.config.max_concurrent_jobs.max(1) - self.slots.available_permits()
    }

    /// Runs until the shutdown token is cancelled, then drains
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            kinds = ?self.handlers.kinds(),
            "Worker orchestrator started"
        );

        let mut last_recovery: Option<Instant> = None;

        while !self.shutdown.is_cancelled() {
            if last_recovery.map_or(true, |at| at.elapsed() >= self.config.recovery_interval()) {
                if let Err(e) = self.queue.recover_stale(self.config.stale_after_secs).await {
                    tracing::error!(error = %e, "Failed to recover stale jobs");
                }
                last_recovery = Some(Instant::now());
            }

            let available = self.slots.available_permits();
            if available == 0 {
                self.pause(Duration::from_millis(100)).await;
                continue;
            }

            let jobs = match self.queue.claim(available).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim jobs");
                    self.pause(self.poll_interval()).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                self.pause(self.poll_interval()).await;
                continue;
            }

            for job in jobs {
                let permit = Arc::clone(&self.slots).acquire_owned().await?;
                self.dispatch(job, permit);
            }
        }

        tracing::info!(active = self.active_jobs(), "Shutting down worker orchestrator");
        self.drain().await;
        tracing::info!("Worker orchestrator shut down");
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_secs)
    }

    /// Sleeps unless shutdown is requested first
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = sleep(duration) => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    /// Waits for running jobs, up to the shutdown timeout
    async fn drain(&self) {
        let all = u32::try_from(self.config.max_concurrent_jobs.max(1)).unwrap_or(u32::MAX);
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);

        match tokio::time::timeout(timeout, self.slots.acquire_many(all)).await {
            Ok(_) => tracing::debug!("All running jobs finished"),
            Err(_) => tracing::warn!(
                count = self.active_jobs(),
                "Shutdown timeout reached with jobs still running"
            ),
        }
    }

    fn dispatch(&self, job: Job, permit: OwnedSemaphorePermit) {
        let handlers = Arc::clone(&self.handlers);
        let queue = self.queue.clone();

        tokio::spawn(async move {
            execute_job(job, &handlers, &queue).await;
            drop(permit);
        });
    }
}

/// Runs one claimed job and records its outcome
async fn execute_job(job: Job, handlers: &HandlerRegistry, queue: &JobQueue) {
    let Some(handler) = handlers.get(job.kind) else {
        tracing::error!(job_id = %job.id, kind = %job.kind, "No handler registered for job kind");
        let error = format!("No handler for job kind: {}", job.kind);
        if let Err(e) = queue.mark_failed(&job, &error, false).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
        }
        return;
    };

    tracing::info!(
        job_id = %job.id,
        kind = %job.kind,
        attempt = job.attempts,
        "Executing job"
    );
    let started = Instant::now();

    match handler.handle(&job).await {
        Ok(()) => {
            tracing::info!(
                job_id = %job.id,
                kind = %job.kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job succeeded"
            );
            if let Err(e) = queue.mark_succeeded(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as succeeded");
            }
        }
        Err(err) => {
            let message = err.to_string();
            match queue.mark_failed(&job, &message, err.is_retryable()).await {
                Ok(Some(JobState::Pending)) => tracing::warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    error = %message,
                    "Job failed, will retry"
                ),
                Ok(Some(_)) => tracing::error!(
                    job_id = %job.id,
                    kind = %job.kind,
                    attempt = job.attempts,
                    error = %message,
                    "Job failed"
                ),
                Ok(None) => tracing::warn!(job_id = %job.id, "Job was no longer running when it failed"),
                Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed"),
            }
        }
    }
}
