//! Connector integration tests, organized by concern.

pub mod admission;
pub mod common;
pub mod concurrency;
pub mod postgres;
