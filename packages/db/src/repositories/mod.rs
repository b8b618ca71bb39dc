//! Repository implementations for database operations.

mod job_repo;

pub use job_repo::{JobRepository, MarkPrinted};
