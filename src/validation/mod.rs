//! Dataset validation for model customization
//!
//! Checks training and validation JSONL files against the record format
//! and the service limits of the target model before anything is uploaded.

pub mod chat;
pub mod dataset;
pub mod registry;
pub mod schema;

pub use dataset::DatasetValidator;
pub use registry::ModelRegistry;
