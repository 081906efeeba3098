//! Job CRUD and queue operations, split by read/write.

pub(crate) mod read;
mod write;
