use serde::{Deserialize, Serialize};

use crate::retry::RetryAttempt;

/// Error codes written to `submission.error_message` when a submission is quarantined.
pub struct SubmissionDlqErrorCode;

impl SubmissionDlqErrorCode {
    /// Dispatching kept failing until the redelivery budget ran out.
    pub const DISPATCH_FAILED: &'static str = "DISPATCH_FAILED";
}

/// Error codes for dead-lettered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqErrorCode {
    /// All redeliveries exhausted.
    MaxRetriesExceeded,
    /// Payload can never be parsed into a submission id.
    DeserializationError,
}

impl DlqErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
        }
    }
}

impl std::fmt::Display for DlqErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type of message that ended up in the dead letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqMessageType {
    /// Submission-ready notification consumed by the dispatcher.
    JudgeTask,
}

impl DlqMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JudgeTask => "judge_task",
        }
    }
}

impl std::fmt::Display for DlqMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DlqMessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "judge_task" => Ok(Self::JudgeTask),
            _ => Err(format!(
                "Invalid message_type '{}'. Must be 'judge_task'",
                s
            )),
        }
    }
}

/// A message that will not be redelivered again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    /// Unique id of the dead-lettered message.
    pub message_id: String,
    /// Type of message that failed.
    pub message_type: DlqMessageType,
    /// Associated submission ID.
    ///
    /// `None` when the payload could not be parsed into an id.
    pub submission_id: Option<i64>,
    /// Original message payload.
    pub payload: serde_json::Value,
    /// Machine-readable error code.
    pub error_code: DlqErrorCode,
    /// Human-readable error message.
    pub error_message: String,
    /// Failed deliveries that led here.
    pub retry_history: Vec<RetryAttempt>,
}
