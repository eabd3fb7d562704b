mod commit;
mod common;
mod dlq;
mod scenarios;
