use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::scheduler::NoAvailableSandbox;
use crate::store::StoreError;

/// Why a delivery could not be processed.
///
/// Everything except [`ProcessError::InvalidPayload`] is worth another
/// delivery: the submission row is still `Pending` when any of these occur.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to load submission: {0}")]
    Load(#[source] StoreError),

    #[error("Processing cancelled")]
    Cancelled,

    #[error(transparent)]
    NoAvailableSandbox(#[from] NoAvailableSandbox),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Failed to commit result: {0}")]
    Commit(#[source] StoreError),
}

impl ProcessError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidPayload(_))
    }

    /// Pipeline step that failed, for logs.
    pub fn step(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "parse",
            Self::Load(_) => "load",
            Self::Cancelled => "cancelled",
            Self::NoAvailableSandbox(_) => "select",
            Self::Sandbox(_) => "dispatch",
            Self::Commit(_) => "commit",
        }
    }
}
