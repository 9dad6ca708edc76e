//! Persistent store: models and transactional operations.

pub mod articles;
pub mod categories;
pub mod jobs;
pub mod models;
