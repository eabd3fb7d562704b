pub mod dead_letter_message;
pub mod problem;
pub mod submission;
