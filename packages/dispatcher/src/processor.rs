//! Turns one submission id into at most one committed verdict.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use common::{SubmissionStatus, Verdict};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::entity::submission;
use crate::error::ProcessError;
use crate::sandbox::JudgeClient;
use crate::scheduler::SandboxSelector;
use crate::store::{CommitOutcome, JudgedSubmission, SubmissionStore};

/// Cancellation scope of one delivery.
///
/// Done once the shutdown token fires, [`DeliveryContext::cancel`] is called,
/// or the deadline passes, whichever comes first.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    token: CancellationToken,
    deadline: Instant,
}

impl DeliveryContext {
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Resolves when the context is done.
    pub async fn done(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    AlreadyProcessed,
}

/// Successful end state of a delivery. Both variants acknowledge the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed(SubmissionStatus),
    Skipped(SkipReason),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed(status) => write!(f, "committed ({status})"),
            Self::Skipped(SkipReason::NotFound) => write!(f, "skipped (not found)"),
            Self::Skipped(SkipReason::AlreadyProcessed) => write!(f, "skipped (already processed)"),
        }
    }
}

pub struct TaskProcessor {
    store: Arc<dyn SubmissionStore>,
    selector: Arc<SandboxSelector>,
    client: Arc<dyn JudgeClient>,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        selector: Arc<SandboxSelector>,
        client: Arc<dyn JudgeClient>,
    ) -> Self {
        Self {
            store,
            selector,
            client,
        }
    }

    /// Load, guard, dispatch and commit one submission.
    ///
    /// Never retries internally; a returned error leaves the row `Pending`.
    #[instrument(skip(self, ctx))]
    pub async fn process(
        &self,
        submission_id: i64,
        ctx: &DeliveryContext,
    ) -> Result<Outcome, ProcessError> {
        let Some(submission) = self
            .store
            .find(submission_id)
            .await
            .map_err(ProcessError::Load)?
        else {
            info!("Submission not found, skipping");
            return Ok(Outcome::Skipped(SkipReason::NotFound));
        };

        if submission.status.is_final() {
            info!(status = %submission.status, "Submission already processed, skipping");
            return Ok(Outcome::Skipped(SkipReason::AlreadyProcessed));
        }

        if ctx.is_done() {
            debug!("Delivery cancelled before dispatch");
            return Err(ProcessError::Cancelled);
        }

        let sandbox = self.selector.select()?;
        let endpoint = sandbox.endpoint().to_string();
        debug!(endpoint = %endpoint, "Dispatching submission");

        let verdict = tokio::select! {
            biased;
            _ = ctx.done() => {
                warn!(endpoint = %endpoint, "Delivery cancelled while waiting for sandbox");
                return Err(ProcessError::Cancelled);
            }
            res = self.client.judge(&endpoint, &submission) => res?,
        };
        drop(sandbox);

        let judged = judged_from_verdict(&submission, &verdict);
        if !verdict.is_recognized() {
            warn!(
                endpoint = %endpoint,
                verdict = %verdict.status,
                "Unrecognized verdict status, recording SystemError"
            );
        }

        match self
            .store
            .commit(&judged)
            .await
            .map_err(ProcessError::Commit)?
        {
            CommitOutcome::Committed => {
                info!(
                    endpoint = %endpoint,
                    status = %judged.status,
                    run_time = ?judged.run_time,
                    memory = ?judged.memory,
                    "Committed judge result"
                );
                Ok(Outcome::Committed(judged.status))
            }
            CommitOutcome::AlreadyFinal => {
                info!("Submission finalized concurrently, result discarded");
                Ok(Outcome::Skipped(SkipReason::AlreadyProcessed))
            }
        }
    }
}

/// Map a sandbox verdict onto the judged columns of `submission`.
///
/// `judge_info` carries the sandbox message; `error_message` is only filled
/// for compile and system errors.
pub fn judged_from_verdict(submission: &submission::Model, verdict: &Verdict) -> JudgedSubmission {
    let status = verdict.submission_status();
    let message = Some(verdict.message.clone()).filter(|m| !m.is_empty());

    let error_message = if !verdict.is_recognized() {
        Some(format!("unrecognized verdict status {:?}", verdict.status))
    } else {
        match status {
            SubmissionStatus::CompileError | SubmissionStatus::SystemError => message.clone(),
            _ => None,
        }
    };

    JudgedSubmission {
        id: submission.id,
        problem_id: submission.problem_id,
        status,
        run_time: Some(verdict.time_used),
        memory: Some(verdict.memory_used),
        judge_info: message,
        error_message,
    }
}
