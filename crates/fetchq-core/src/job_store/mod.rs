//! Durable job store (SQLite via sqlx).
//!
//! Holds one row per job (requested items, priority, lifecycle timestamps,
//! cancel flag) and one row per terminal item result. Progress counters are
//! derived from the result rows on read and never stored.

pub mod db;
mod jobs;
pub mod types;

pub use db::{default_db_path, unix_millis, unix_timestamp, JobDb};
pub use jobs::read::JobFilter;
pub use types::*;

#[cfg(test)]
mod tests;
