// ============================================================
// Error Kinds
// ============================================================
// Typed failures of a fine-tuning job. Everything below the
// driver uses anyhow::Result with context; the driver turns
// those into one of these kinds so the retry state machine
// and the process exit code can match on them.
//
//   ConfigUnreadable      → fatal, exit code 1
//   TrainingAttemptFailed → recoverable up to the retry bound
//   RetryBoundExceeded    → fatal, carries the last error
//   LogSinkUnavailable    → diagnostic only, never fatal
//   ModelSave             → final artifact not written, fatal
//
// An empty checkpoint directory is not an error: discovery
// returns None and training starts fresh.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinetuneError {
    #[error("cannot read config '{}': {cause:#}", path.display())]
    ConfigUnreadable { path: PathBuf, cause: anyhow::Error },

    #[error("training attempt {attempt} failed: {cause:#}")]
    TrainingAttemptFailed { attempt: usize, cause: anyhow::Error },

    #[error("training failed permanently after {attempts} attempt(s): {last:#}")]
    RetryBoundExceeded { attempts: usize, last: anyhow::Error },

    #[error("progress log '{}' unavailable: {cause}", path.display())]
    LogSinkUnavailable { path: PathBuf, cause: std::io::Error },

    #[error("cannot save final model: {0:#}")]
    ModelSave(anyhow::Error),
}

impl FinetuneError {
    /// Process exit code for a failure that ends the run
    pub fn exit_code(&self) -> i32 {
        match self {
            FinetuneError::RetryBoundExceeded { .. } => 2,
            _ => 1,
        }
    }

    /// A failed attempt becomes terminal once the retry bound is reached
    pub fn into_retry_bound(self) -> Self {
        match self {
            FinetuneError::TrainingAttemptFailed { attempt, cause } => {
                FinetuneError::RetryBoundExceeded { attempts: attempt, last: cause }
            }
            other => other,
        }
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, FinetuneError>;
