//! Start/stop errors shared by background tasks

use std::time::Duration;

use fintrack_domain::FinTrackError;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

/// Lifecycle errors for periodic tasks (probe loop, session sweep)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Task is already running
    #[error("Task already running")]
    AlreadyRunning,

    /// Task is not running
    #[error("Task not running")]
    NotRunning,

    /// Task did not finish within the join timeout
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Task panicked or was aborted
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<LifecycleError> for FinTrackError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyRunning | LifecycleError::NotRunning => {
                Self::InvalidInput(err.to_string())
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}

/// Convenience type alias for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Await a cancelled task, bounded by `join_timeout`.
pub(crate) async fn join_with_timeout(
    handle: JoinHandle<()>,
    join_timeout: Duration,
    task_name: &str,
) -> LifecycleResult<()> {
    match tokio::time::timeout(join_timeout, handle).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(task = task_name, error = %e, "Task panicked");
            Err(LifecycleError::TaskJoinFailed(e.to_string()))
        }
        Err(_) => {
            warn!(task = task_name, "Task did not complete within timeout");
            Err(LifecycleError::Timeout { seconds: join_timeout.as_secs() })
        }
    }
}
