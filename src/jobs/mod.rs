//! Remote job helpers
//!
//! Submission and status polling for fine-tuning jobs and asynchronous
//! invocations.

pub mod async_invoke;
pub mod customization;
pub mod poller;
