use serde::{Deserialize, Serialize};

use crate::SubmissionStatus;

/// Judgment returned by a sandbox for one submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Sandbox status string, e.g. "Accepted" or "TLE".
    pub status: String,
    /// Human-readable message from the sandbox (compiler output, checker note, ...).
    pub message: String,
    /// Time used in milliseconds.
    pub time_used: i64,
    /// Memory used in kibibytes.
    pub memory_used: i64,
}

/// Every verdict spelling a sandbox is known to report.
///
/// Lookups are ASCII case-insensitive. Anything not listed here maps to
/// [`SubmissionStatus::SystemError`].
pub const VERDICT_STATUS_TABLE: &[(&str, SubmissionStatus)] = &[
    ("Accepted", SubmissionStatus::Accepted),
    ("AC", SubmissionStatus::Accepted),
    ("CompileError", SubmissionStatus::CompileError),
    ("CompilationError", SubmissionStatus::CompileError),
    ("Compile Error", SubmissionStatus::CompileError),
    ("CE", SubmissionStatus::CompileError),
    ("WrongAnswer", SubmissionStatus::WrongAnswer),
    ("Wrong Answer", SubmissionStatus::WrongAnswer),
    ("WA", SubmissionStatus::WrongAnswer),
    ("TimeLimitExceeded", SubmissionStatus::TimeLimitExceeded),
    ("Time Limit Exceeded", SubmissionStatus::TimeLimitExceeded),
    ("TLE", SubmissionStatus::TimeLimitExceeded),
    ("MemoryLimitExceeded", SubmissionStatus::MemoryLimitExceeded),
    ("Memory Limit Exceeded", SubmissionStatus::MemoryLimitExceeded),
    ("MLE", SubmissionStatus::MemoryLimitExceeded),
    ("RuntimeError", SubmissionStatus::RuntimeError),
    ("Runtime Error", SubmissionStatus::RuntimeError),
    ("RE", SubmissionStatus::RuntimeError),
    ("SystemError", SubmissionStatus::SystemError),
    ("System Error", SubmissionStatus::SystemError),
    ("SE", SubmissionStatus::SystemError),
];

/// Look up a sandbox status string in [`VERDICT_STATUS_TABLE`].
///
/// `Pending` is never a valid answer from a sandbox and is not in the table.
pub fn lookup_verdict_status(raw: &str) -> Option<SubmissionStatus> {
    let raw = raw.trim();
    VERDICT_STATUS_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, status)| *status)
}

impl Verdict {
    /// Final submission status for this verdict, `SystemError` when unrecognized.
    pub fn submission_status(&self) -> SubmissionStatus {
        lookup_verdict_status(&self.status).unwrap_or(SubmissionStatus::SystemError)
    }

    /// Whether the sandbox status string is in the mapping table.
    pub fn is_recognized(&self) -> bool {
        lookup_verdict_status(&self.status).is_some()
    }
}
