//! Structural checks for conversation and prompt/completion records
//!
//! Each check walks the raw JSON so every problem in a record is reported
//! with the path of the offending field, instead of stopping at the first
//! deserialization failure.

use crate::core::constants::{CONVERSATION_SCHEMA_VERSION, keys, role};
use crate::validation::registry::ModelType;
use serde_json::{Map, Value};

fn field_error(path: &str, message: &str) -> String {
    format!("Field '{path}': {message}")
}

fn expect_string(object: &Map<String, Value>, key: &str, path: &str, errors: &mut Vec<String>) {
    if let Some(value) = object.get(key) {
        if !value.is_string() {
            errors.push(field_error(&format!("{path}.{key}"), "expected a string"));
        }
    }
}

/// Validate an `image` or `video` block
fn check_media(block: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(media) = block.as_object() else {
        errors.push(field_error(path, "expected an object"));
        return;
    };

    match media.get(keys::FORMAT) {
        Some(Value::String(_)) => {}
        Some(_) => errors.push(field_error(&format!("{path}.format"), "expected a string")),
        None => errors.push(field_error(path, "'format' is a required property")),
    }

    let Some(source) = media.get(keys::SOURCE) else {
        errors.push(field_error(path, "'source' is a required property"));
        return;
    };
    let source_path = format!("{path}.source");
    let Some(source) = source.as_object() else {
        errors.push(field_error(&source_path, "expected an object"));
        return;
    };

    let Some(location) = source.get(keys::S3_LOCATION) else {
        errors.push(field_error(&source_path, "'s3Location' is a required property"));
        return;
    };
    let location_path = format!("{source_path}.s3Location");
    let Some(location) = location.as_object() else {
        errors.push(field_error(&location_path, "expected an object"));
        return;
    };

    match location.get(keys::URI) {
        Some(Value::String(uri)) if uri.starts_with("s3://") => {}
        Some(Value::String(uri)) => errors.push(field_error(
            &format!("{location_path}.uri"),
            &format!("'{uri}' does not match '^s3://.*'"),
        )),
        Some(_) => errors.push(field_error(&format!("{location_path}.uri"), "expected a string")),
        None => errors.push(field_error(&location_path, "'uri' is a required property")),
    }

    expect_string(location, keys::BUCKET_OWNER, &location_path, errors);
}

fn check_system(system: &Value, errors: &mut Vec<String>) {
    let Some(blocks) = system.as_array() else {
        errors.push(field_error(keys::SYSTEM, "expected an array"));
        return;
    };
    if blocks.len() != 1 {
        errors.push(field_error(
            keys::SYSTEM,
            &format!("expected exactly 1 item, found {}", blocks.len()),
        ));
    }
    for (index, block) in blocks.iter().enumerate() {
        let path = format!("system.{index}");
        match block.as_object() {
            Some(object) => match object.get(keys::TEXT) {
                Some(Value::String(_)) => {}
                Some(_) => errors.push(field_error(&format!("{path}.text"), "expected a string")),
                None => errors.push(field_error(&path, "'text' is a required property")),
            },
            None => errors.push(field_error(&path, "expected an object")),
        }
    }
}

fn check_message(message: &Value, index: usize, model_type: ModelType, errors: &mut Vec<String>) {
    let path = format!("messages.{index}");
    let Some(message) = message.as_object() else {
        errors.push(field_error(&path, "expected an object"));
        return;
    };

    let role = match message.get(keys::ROLE) {
        Some(Value::String(role)) if role::SUPPORTED.contains(&role.as_str()) => Some(role.as_str()),
        Some(Value::String(role)) => {
            errors.push(format!(
                "The role '{role}' is not supported. Supported roles are: {}",
                role::SUPPORTED.join(", ")
            ));
            None
        }
        Some(_) => {
            errors.push(field_error(&format!("{path}.role"), "expected a string"));
            None
        }
        None => {
            errors.push(field_error(&path, "'role' is a required property"));
            None
        }
    };

    let Some(content) = message.get(keys::CONTENT) else {
        errors.push(field_error(&path, "'content' is a required property"));
        return;
    };
    let content_path = format!("{path}.content");
    let Some(blocks) = content.as_array() else {
        errors.push(field_error(&content_path, "expected an array"));
        return;
    };
    if blocks.is_empty() {
        errors.push(field_error(&content_path, "expected at least 1 item"));
    }

    for (block_index, block) in blocks.iter().enumerate() {
        let block_path = format!("{content_path}.{block_index}");
        let Some(block) = block.as_object() else {
            errors.push(field_error(&block_path, "expected an object"));
            continue;
        };

        expect_string(block, keys::TEXT, &block_path, errors);

        for media_key in [keys::IMAGE, keys::VIDEO] {
            let Some(media) = block.get(media_key) else {
                continue;
            };
            check_media(media, &format!("{block_path}.{media_key}"), errors);

            if model_type == ModelType::Text {
                errors.push(format!(
                    "Model accepts text only, but {block_path} contains {media_key} content"
                ));
            }
        }

        if block.contains_key(keys::IMAGE) && role == Some(role::ASSISTANT) {
            errors.push(format!(
                "A message with the role '{}' should not contain any images",
                role::ASSISTANT
            ));
        }
    }
}

/// Validate a `bedrock-conversation-2024` record
pub fn validate_converse(row: &Value, model_type: ModelType) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(object) = row.as_object() else {
        return vec!["Record must be a JSON object".to_string()];
    };

    match object.get(keys::SCHEMA_VERSION) {
        None => {}
        Some(Value::String(version)) if version == CONVERSATION_SCHEMA_VERSION => {}
        Some(other) => errors.push(field_error(
            keys::SCHEMA_VERSION,
            &format!("expected '{CONVERSATION_SCHEMA_VERSION}', found {other}"),
        )),
    }

    if let Some(system) = object.get(keys::SYSTEM) {
        check_system(system, &mut errors);
    }

    match object.get(keys::MESSAGES) {
        None => errors.push("'messages' is a required property".to_string()),
        Some(Value::Array(messages)) => {
            if messages.len() < 2 {
                errors.push(field_error(
                    keys::MESSAGES,
                    &format!("expected at least 2 items, found {}", messages.len()),
                ));
            }
            for (index, message) in messages.iter().enumerate() {
                check_message(message, index, model_type, &mut errors);
            }
        }
        Some(_) => errors.push(field_error(keys::MESSAGES, "expected an array")),
    }

    errors
}

/// Validate a `{prompt, completion}` record
pub fn validate_prompt_completion(row: &Value) -> Vec<String> {
    let Some(object) = row.as_object() else {
        return vec!["Record must be a JSON object".to_string()];
    };

    let mut errors = Vec::new();
    for key in [keys::PROMPT, keys::COMPLETION] {
        match object.get(key) {
            Some(Value::String(_)) => {}
            Some(_) => errors.push(field_error(key, "expected a string")),
            None => errors.push(format!("'{key}' is a required property")),
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_block(uri: &str) -> Value {
        json!({"image": {"format": "png", "source": {"s3Location": {"uri": uri}}}})
    }

    #[test]
    fn test_valid_converse_record() {
        let row = json!({
            "schemaVersion": "bedrock-conversation-2024",
            "system": [{"text": "You are helpful"}],
            "messages": [
                {"role": "user", "content": [{"text": "Describe"}, image_block("s3://bucket/a.png")]},
                {"role": "assistant", "content": [{"text": "A cat"}]}
            ]
        });
        assert!(validate_converse(&row, ModelType::Multimodal).is_empty());
    }

    #[test]
    fn test_single_message_is_rejected() {
        let row = json!({"messages": [{"role": "user", "content": [{"text": "hi"}]}]});
        let errors = validate_converse(&row, ModelType::Text);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("at least 2 items"));
    }

    #[test]
    fn test_missing_messages() {
        let errors = validate_converse(&json!({"system": [{"text": "x"}]}), ModelType::Text);
        assert_eq!(errors, vec!["'messages' is a required property".to_string()]);
    }

    #[test]
    fn test_unsupported_role() {
        let row = json!({"messages": [
            {"role": "system", "content": [{"text": "a"}]},
            {"role": "assistant", "content": [{"text": "b"}]}
        ]});
        let errors = validate_converse(&row, ModelType::Text);
        assert!(errors.iter().any(|e| e.contains("The role 'system' is not supported")));
    }

    #[test]
    fn test_assistant_image_is_rejected() {
        let row = json!({"messages": [
            {"role": "user", "content": [{"text": "a"}]},
            {"role": "assistant", "content": [image_block("s3://bucket/b.png")]}
        ]});
        let errors = validate_converse(&row, ModelType::Multimodal);
        assert_eq!(
            errors,
            vec!["A message with the role 'assistant' should not contain any images".to_string()]
        );
    }

    #[test]
    fn test_image_requires_s3_uri() {
        let row = json!({"messages": [
            {"role": "user", "content": [image_block("https://example.com/a.png")]},
            {"role": "assistant", "content": [{"text": "b"}]}
        ]});
        let errors = validate_converse(&row, ModelType::Multimodal);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("does not match '^s3://.*'"));
    }

    #[test]
    fn test_text_model_rejects_media() {
        let row = json!({"messages": [
            {"role": "user", "content": [{"video": {"format": "mp4", "source": {"s3Location": {"uri": "s3://b/v.mp4"}}}}]},
            {"role": "assistant", "content": [{"text": "b"}]}
        ]});
        let errors = validate_converse(&row, ModelType::Text);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("text only"));
    }

    #[test]
    fn test_system_must_have_one_block() {
        let row = json!({
            "system": [{"text": "a"}, {"text": "b"}],
            "messages": [
                {"role": "user", "content": [{"text": "a"}]},
                {"role": "assistant", "content": [{"text": "b"}]}
            ]
        });
        let errors = validate_converse(&row, ModelType::Text);
        assert!(errors[0].contains("exactly 1 item"));
    }

    #[test]
    fn test_wrong_schema_version() {
        let row = json!({
            "schemaVersion": "bedrock-conversation-2023",
            "messages": [
                {"role": "user", "content": [{"text": "a"}]},
                {"role": "assistant", "content": [{"text": "b"}]}
            ]
        });
        let errors = validate_converse(&row, ModelType::Text);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Field 'schemaVersion'"));
    }

    #[test]
    fn test_prompt_completion() {
        assert!(validate_prompt_completion(&json!({"prompt": "a", "completion": "b", "extra": 1})).is_empty());

        let errors = validate_prompt_completion(&json!({"prompt": 3}));
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("expected a string"));
        assert!(errors[1].contains("'completion' is a required property"));

        assert_eq!(validate_prompt_completion(&json!([1, 2])).len(), 1);
    }
}
