//! Training dataset records
//!
//! Typed shapes of the JSONL records accepted by model customization jobs.

use crate::core::constants::CONVERSATION_SCHEMA_VERSION;
use crate::core::constants::role;
use serde::{Deserialize, Serialize};

/// S3 object reference inside an image or video block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Location {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
    pub s3_location: S3Location,
}

/// Image or video content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBlock {
    pub format: String,
    pub source: MediaSource,
}

/// Content block of a conversation turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaBlock>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverseTurn {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
}

/// `bedrock-conversation-2024` training record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverseRecord {
    #[serde(rename = "schemaVersion", skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemBlock>>,
    pub messages: Vec<ConverseTurn>,
}

impl ConverseRecord {
    /// Single-turn record: one user prompt answered by one completion
    pub fn single_turn(prompt: &str, completion: &str, system: Option<&str>) -> Self {
        let system = system
            .filter(|text| !text.is_empty())
            .map(|text| vec![SystemBlock { text: text.to_string() }]);

        Self {
            schema_version: Some(CONVERSATION_SCHEMA_VERSION.to_string()),
            system,
            messages: vec![
                ConverseTurn {
                    role: role::USER.to_string(),
                    content: vec![ContentBlock::text(prompt)],
                },
                ConverseTurn {
                    role: role::ASSISTANT.to_string(),
                    content: vec![ContentBlock::text(completion)],
                },
            ],
        }
    }
}

/// Message of a chat-format record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat-format training record with plain-string content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}
