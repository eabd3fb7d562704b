mod service;

pub use service::{DeadLetterSink, DlqService, QuarantineOutcome, quarantine_submission};
