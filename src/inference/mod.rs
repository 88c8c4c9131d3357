//! Inference helpers: single completions, batch answering, image
//! generation and guardrails

pub mod batch;
pub mod converse;
pub mod guardrail;
pub mod image;
