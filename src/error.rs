use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Job submission failed: {0}")]
    Submission(String),

    #[error("Precondition failed: {0}")]
    StateGuard(String),

    #[error("Invalid data format: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Transient transport faults may be retried by the adapters; everything
    /// else (guards, bad data, config) is deterministic and must surface.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::Transport(_))
    }
}

impl From<anyhow::Error> for ScanError {
    fn from(err: anyhow::Error) -> Self {
        ScanError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::Transport(err.to_string())
    }
}
