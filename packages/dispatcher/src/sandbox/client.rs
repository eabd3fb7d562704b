use std::time::Duration;

use async_trait::async_trait;
use common::Verdict;
use reqwest::StatusCode;
use tracing::debug;

use super::{JudgeClient, SandboxError};
use crate::entity::submission;

pub const JUDGE_PATH: &str = "/judge";

/// `POST http://{endpoint}/judge` with the submission row as JSON.
///
/// One `reqwest::Client` is shared by every dispatch so connections to the
/// same sandbox are pooled.
#[derive(Debug, Clone)]
pub struct HttpSandboxClient {
    http: reqwest::Client,
}

impl HttpSandboxClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    fn url(endpoint: &str) -> String {
        format!("http://{endpoint}{JUDGE_PATH}")
    }
}

#[async_trait]
impl JudgeClient for HttpSandboxClient {
    async fn judge(
        &self,
        endpoint: &str,
        submission: &submission::Model,
    ) -> Result<Verdict, SandboxError> {
        let url = Self::url(endpoint);
        let transport = |reason: String| SandboxError::Transport {
            endpoint: endpoint.to_string(),
            reason,
        };

        let response = self
            .http
            .post(&url)
            .json(submission)
            .send()
            .await
            .map_err(|e| transport(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport(format!("failed to read response body: {e}")))?;

        if status != StatusCode::OK {
            return Err(transport(format!("HTTP {status}: {body}")));
        }

        let verdict: Verdict =
            serde_json::from_str(&body).map_err(|e| SandboxError::Protocol {
                endpoint: endpoint.to_string(),
                reason: format!("invalid verdict JSON: {e}"),
            })?;

        debug!(
            submission_id = submission.id,
            endpoint = %endpoint,
            verdict = %verdict.status,
            "Sandbox returned verdict"
        );
        Ok(verdict)
    }
}
