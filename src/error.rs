// ⚠️ Pipeline errors - what a failed unit of work looks like to its caller
//
// Resolution misses and rows without a natural key never reach this type:
// the first degrade to a null resolved id, the second are skipped.

use thiserror::Error;

/// Result of a unit of work (one holding identifier)
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Another unit holds the lock; retry later, never proceed without it
    #[error("lock contention on '{resource}' after {attempts} attempts")]
    LockContention { resource: String, attempts: u32 },

    /// Cooperative cancellation observed between stages
    #[error("cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    /// The batch key is unusable (blank CPH, rows for another boundary)
    #[error("invalid boundary: {0}")]
    InvalidBoundary(String),

    /// Store or I/O failure mid-sequence; recovery is reprocessing the boundary
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    /// Transient errors are worth retrying on a later pass
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::LockContention { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_is_transient() {
        let err = PipelineError::LockContention {
            resource: "site:12/345/6789".to_string(),
            attempts: 3,
        };
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "lock contention on 'site:12/345/6789' after 3 attempts"
        );
    }

    #[test]
    fn test_store_error_is_not_transient() {
        let err: PipelineError = anyhow::anyhow!("disk full").into();
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "disk full");
    }
}
