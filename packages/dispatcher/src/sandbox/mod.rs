//! Client side of the sandbox judge protocol.

mod client;

use async_trait::async_trait;
use common::Verdict;
use thiserror::Error;

use crate::entity::submission;

pub use client::HttpSandboxClient;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// The request never produced a usable response: connection refused,
    /// timeout, non-200 status.
    #[error("Sandbox {endpoint} unreachable: {reason}")]
    Transport { endpoint: String, reason: String },

    /// A 200 response whose body is not a verdict.
    #[error("Sandbox {endpoint} sent an invalid response: {reason}")]
    Protocol { endpoint: String, reason: String },
}

impl SandboxError {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Transport { endpoint, .. } | Self::Protocol { endpoint, .. } => endpoint,
        }
    }
}

/// Sends one submission to one sandbox and waits for the verdict.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(
        &self,
        endpoint: &str,
        submission: &submission::Model,
    ) -> Result<Verdict, SandboxError>;
}
