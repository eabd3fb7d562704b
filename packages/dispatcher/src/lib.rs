pub mod config;
pub mod consumer;
pub mod database;
pub mod discovery;
pub mod dlq;
pub mod entity;
pub mod error;
pub mod processor;
pub mod sandbox;
pub mod scheduler;
pub mod store;

pub use config::AppConfig;
pub use consumer::{JudgeTaskConsumer, parse_submission_id};
pub use error::ProcessError;
pub use processor::{DeliveryContext, Outcome, SkipReason, TaskProcessor};
