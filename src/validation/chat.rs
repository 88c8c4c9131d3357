//! Chat-format record checks
//!
//! Chat records carry a plain-string system prompt and plain-string
//! message content. Beyond the shape, the conversation must start with the
//! user, end with the assistant, alternate strictly and stay clear of the
//! reserved turn markers.

use crate::core::constants::{limits, role};
use crate::models::dataset::ChatRecord;
use serde::Deserialize;
use serde_json::Value;

/// Estimated token count of a record: characters divided by the
/// characters-per-token ratio, summed over system prompt and messages.
pub fn estimate_tokens(record: &ChatRecord) -> usize {
    let system = record
        .system
        .as_deref()
        .map(|text| text.chars().count() / limits::CHARS_PER_TOKEN)
        .unwrap_or(0);

    record
        .messages
        .iter()
        .map(|message| message.content.chars().count() / limits::CHARS_PER_TOKEN)
        .sum::<usize>()
        + system
}

fn reserved_keyword(text: &str) -> Option<&'static str> {
    limits::RESERVED_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| text.contains(keyword))
}

/// First conversation-structure problem of a well-formed record
fn structure_error(record: &ChatRecord) -> Option<String> {
    let first = record.messages.first().map(|m| m.role.as_str());
    let last = record.messages.last().map(|m| m.role.as_str());
    if first != Some(role::USER) || last != Some(role::ASSISTANT) {
        return Some("Messages must start with user and end with assistant".to_string());
    }

    if record
        .messages
        .windows(2)
        .any(|pair| pair[0].role == pair[1].role)
    {
        return Some("Messages must alternate between user and assistant".to_string());
    }

    if let Some(keyword) = record.system.as_deref().and_then(reserved_keyword) {
        return Some(format!(
            "Reserved keyword '{}' found in system prompt",
            keyword.escape_debug()
        ));
    }

    record
        .messages
        .iter()
        .find_map(|message| reserved_keyword(&message.content))
        .map(|keyword| {
            format!(
                "Reserved keyword '{}' found in message content",
                keyword.escape_debug()
            )
        })
}

/// Validate one chat-format record
pub fn validate_chat(row: &Value) -> Vec<String> {
    let record = match ChatRecord::deserialize(row) {
        Ok(record) => record,
        Err(e) => return vec![format!("Invalid record structure: {e}")],
    };

    let mut errors = Vec::new();
    if record.messages.len() < 2 {
        errors.push(format!(
            "Field 'messages': expected at least 2 items, found {}",
            record.messages.len()
        ));
    }
    for (index, message) in record.messages.iter().enumerate() {
        if !role::SUPPORTED.contains(&message.role.as_str()) {
            errors.push(format!(
                "Field 'messages.{index}.role': '{}' does not match '^(user|assistant)$'",
                message.role
            ));
        }
    }
    if errors.is_empty() {
        errors.extend(
            structure_error(&record).map(|error| format!("Structure error: {error}")),
        );
    }

    let tokens = estimate_tokens(&record);
    if tokens > limits::MAX_TOKENS {
        errors.push(format!(
            "Exceeds maximum token count ({tokens} > {})",
            limits::MAX_TOKENS
        ));
    }

    errors
}
