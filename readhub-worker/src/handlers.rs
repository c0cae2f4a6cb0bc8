/// Job handlers and their registry
///
/// Each [`JobKind`] is served by one [`JobHandler`]. The orchestrator looks
/// the handler up by the claimed job's kind, runs it, and records the
/// outcome on the job row. A handler error says whether the job is worth
/// retrying; the queue decides whether attempts remain.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use readhub_shared::models::job::{Job, JobKind};
/// use readhub_worker::handlers::{HandlerError, HandlerRegistry, JobHandler};
/// use std::sync::Arc;
///
/// struct Noop;
///
/// #[async_trait]
/// impl JobHandler for Noop {
///     fn kind(&self) -> JobKind {
///         JobKind::Embed
///     }
///
///     async fn handle(&self, _job: &Job) -> Result<(), HandlerError> {
///         Ok(())
///     }
/// }
///
/// let mut registry = HandlerRegistry::new();
/// registry.register(Arc::new(Noop));
/// assert!(registry.get(JobKind::Embed).is_some());
/// ```

use async_trait::async_trait;
use readhub_shared::models::job::{Job, JobKind};
use readhub_shared::storage::StorageError;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{message}")]
    Failed { message: String, retryable: bool },
}

impl HandlerError {
    /// Failure that will not go away on retry
    pub fn permanent(message: impl Into<String>) -> Self {
        HandlerError::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    /// Failure worth retrying later
    pub fn transient(message: impl Into<String>) -> Self {
        HandlerError::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Payload(_) => false,
            HandlerError::Database(_) => true,
            HandlerError::Failed { retryable, .. } => *retryable,
        }
    }
}

impl From<StorageError> for HandlerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(_) => HandlerError::transient(err.to_string()),
            _ => HandlerError::permanent(err.to_string()),
        }
    }
}

/// Work performed for one kind of job
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn handle(&self, job: &Job) -> Result<(), HandlerError>;
}

/// Handlers keyed by the job kind they serve
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for its kind
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            tracing::warn!(kind = %kind, "Replaced job handler");
        }
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Registered kinds, sorted by name
    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<JobKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
