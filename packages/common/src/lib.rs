pub mod config;
pub mod dlq;
pub mod retry;
pub mod submission_status;
pub mod verdict;

pub use config::{DlqConfig, MqAppConfig};
pub use dlq::{DlqEnvelope, DlqErrorCode, DlqMessageType, SubmissionDlqErrorCode};
pub use submission_status::SubmissionStatus;
pub use verdict::Verdict;
