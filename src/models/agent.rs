//! Agent action-group data models
//!
//! The event an agent sends to an action-group handler and the two response
//! envelopes it accepts back: one for OpenAPI-schema action groups (keyed by
//! `apiPath`) and one for function-details action groups (keyed by
//! `function`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Content type key used for API-schema request and response bodies
pub const APPLICATION_JSON: &str = "application/json";

/// Content type key used for function-details response bodies
pub const TEXT_BODY: &str = "TEXT";

/// Named parameter passed by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(default)]
    pub value: String,
}

impl ActionParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: Some("string".to_string()),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBodyContent {
    #[serde(default)]
    pub properties: Vec<ActionParameter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub content: HashMap<String, RequestBodyContent>,
}

/// Event delivered to an action-group handler
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    #[serde(default)]
    pub message_version: Option<String>,
    #[serde(default)]
    pub action_group: String,
    #[serde(default)]
    pub api_path: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
    #[serde(default)]
    pub request_body: Option<RequestBody>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub input_text: Option<String>,
    #[serde(default)]
    pub session_attributes: HashMap<String, String>,
    #[serde(default)]
    pub prompt_session_attributes: HashMap<String, String>,
}

impl ActionEvent {
    /// Event calling `function` of a function-details action group
    pub fn function_call(
        action_group: impl Into<String>,
        function: impl Into<String>,
        parameters: Vec<ActionParameter>,
    ) -> Self {
        Self {
            message_version: Some("1.0".to_string()),
            action_group: action_group.into(),
            function: Some(function.into()),
            parameters,
            ..Default::default()
        }
    }

    /// Value of a named parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .map(|parameter| parameter.value.as_str())
    }

    /// Value of a named property in the JSON request body
    pub fn property(&self, name: &str) -> Option<&str> {
        self.request_body
            .as_ref()?
            .content
            .get(APPLICATION_JSON)?
            .properties
            .iter()
            .find(|property| property.name == name)
            .map(|property| property.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBodyText {
    pub body: String,
}

/// Response for an API-schema action group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiActionResponse {
    pub action_group: String,
    pub api_path: String,
    pub http_method: String,
    pub http_status_code: u16,
    pub response_body: HashMap<String, ResponseBodyText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub response_body: HashMap<String, ResponseBodyText>,
}

/// Response for a function-details action group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionActionResponse {
    pub action_group: String,
    pub function: String,
    pub function_response: FunctionResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Api(ApiActionResponse),
    Function(FunctionActionResponse),
}

/// Envelope returned to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponseEnvelope {
    pub message_version: String,
    pub response: ActionResponse,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub session_attributes: HashMap<String, String>,
}

impl ActionResponseEnvelope {
    /// Body string carried by the response, whichever envelope it uses
    pub fn body(&self) -> Option<&str> {
        match &self.response {
            ActionResponse::Api(api) => api.response_body.get(APPLICATION_JSON),
            ActionResponse::Function(function) => {
                function.function_response.response_body.get(TEXT_BODY)
            }
        }
        .map(|text| text.body.as_str())
    }

    /// Body parsed as JSON, when it is JSON
    pub fn body_json(&self) -> Option<Value> {
        self.body().and_then(|body| serde_json::from_str(body).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_parameter_lookup() {
        let event: ActionEvent = serde_json::from_value(json!({
            "messageVersion": "1.0",
            "actionGroup": "ClaimManagementActionGroup",
            "apiPath": "/notify",
            "httpMethod": "POST",
            "parameters": [{"name": "claimId", "type": "string", "value": "claim-006"}],
            "requestBody": {"content": {"application/json": {"properties": [
                {"name": "pendingDocuments", "type": "string", "value": "AccidentImages"}
            ]}}}
        }))
        .unwrap();

        assert_eq!(event.parameter("claimId"), Some("claim-006"));
        assert_eq!(event.parameter("missing"), None);
        assert_eq!(event.property("pendingDocuments"), Some("AccidentImages"));
        assert_eq!(event.property("claimId"), None);
    }

    #[test]
    fn test_function_envelope_serialization() {
        let envelope = ActionResponseEnvelope {
            message_version: "1.0".to_string(),
            response: ActionResponse::Function(FunctionActionResponse {
                action_group: "bookings".to_string(),
                function: "create_booking".to_string(),
                function_response: FunctionResponse {
                    response_body: HashMap::from([(
                        TEXT_BODY.to_string(),
                        ResponseBodyText {
                            body: "{}".to_string(),
                        },
                    )]),
                },
            }),
            session_attributes: HashMap::new(),
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["messageVersion"], "1.0");
        assert_eq!(
            value["response"]["functionResponse"]["responseBody"]["TEXT"]["body"],
            "{}"
        );
        assert!(value.get("sessionAttributes").is_none());
        assert_eq!(envelope.body(), Some("{}"));
    }
}
