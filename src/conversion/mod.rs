//! Dataset format converters

pub mod dataset_converter;

pub use dataset_converter::{json_to_jsonl, prompt_completion_to_converse};
