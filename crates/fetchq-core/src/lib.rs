pub mod config;
pub mod logging;

pub mod checksum;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod governor;
pub mod job_store;
pub mod layout;
pub mod retry;
pub mod service;
pub mod sweeper;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MissingItem, ServiceError};
