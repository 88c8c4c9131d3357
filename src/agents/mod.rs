//! Bedrock agents: invocation, event-stream decoding, action-group handlers
//! and prompt tool helpers

pub mod actions;
pub mod eventstream;
pub mod runtime;
pub mod tools;
