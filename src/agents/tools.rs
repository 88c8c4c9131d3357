//! Prompt-based tool use
//!
//! Tools are advertised to the model as XML in the system prompt. The model
//! answers with a `<function_calls>` block naming a tool and its parameters;
//! the call runs against an action-group function and its output goes back
//! to the model as a `<function_results>` block until it answers in prose.

use crate::agents::actions::ActionRouter;
use crate::core::constants::role;
use crate::core::provider::{BedrockError, ModelRuntime};
use crate::core::xml::{child_elements, element_bodies, extract_tags};
use crate::inference::converse::CompletionSettings;
use crate::models::agent::{ActionEvent, ActionParameter};
use crate::models::bedrock::{
    ConverseContent, ConverseMessage, ConverseRequest, InferenceParameters, SystemText,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use thiserror::Error;
use tracing::{debug, info, warn};

const FUNCTION_CALLS_END: &str = "</function_calls>";

#[derive(Error, Debug)]
pub enum ToolLoopError {
    #[error(transparent)]
    Bedrock(#[from] BedrockError),

    #[error("No final answer after {0} turn(s)")]
    TooManyTurns(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: String,
    pub description: String,
}

impl ToolParameter {
    pub fn new(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
        }
    }
}

/// A tool advertised to the model inside the prompt
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDescription {
    /// `<tool_description>` block for this tool
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        let _ = write!(
            xml,
            "<tool_description>\n<tool_name>{}</tool_name>\n<description>{}</description>\n<parameters>\n",
            self.name, self.description
        );
        for parameter in &self.parameters {
            let _ = write!(
                xml,
                "<parameter>\n<name>{}</name>\n<type>{}</type>\n<description>{}</description>\n</parameter>\n",
                parameter.name, parameter.param_type, parameter.description
            );
        }
        xml.push_str("</parameters>\n</tool_description>");
        xml
    }
}

/// `<tools>` block listing every tool
pub fn tools_xml<'a>(tools: impl IntoIterator<Item = &'a ToolDescription>) -> String {
    let body: Vec<String> = tools.into_iter().map(ToolDescription::to_xml).collect();
    format!("<tools>\n{}\n</tools>", body.join("\n"))
}

/// `<function_results>` block reporting a tool's output back to the model
pub fn format_function_results(tool_name: &str, output: &str) -> String {
    format!(
        "\n<function_results>\n<result>\n<tool_name>{tool_name}</tool_name>\n<stdout>\n{output}\n</stdout>\n</result>\n</function_results>\n"
    )
}

/// One `<invoke>` requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool_name: String,
    pub parameters: BTreeMap<String, String>,
}

/// Every complete `<invoke>` block in a model reply
///
/// Blocks without a `<tool_name>` are skipped. A missing `<parameters>`
/// element gives an empty parameter map.
pub fn parse_function_calls(text: &str) -> Vec<ToolCall> {
    element_bodies(text, "invoke")
        .into_iter()
        .filter_map(|invoke| {
            let tool_name = extract_tags(invoke, "tool_name")
                .into_iter()
                .next()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())?;
            let parameters = element_bodies(invoke, "parameters")
                .first()
                .map(|body| child_elements(body).into_iter().collect())
                .unwrap_or_default();
            Some(ToolCall {
                tool_name,
                parameters,
            })
        })
        .collect()
}

/// Tools backed by action-group functions
pub struct ToolBox {
    router: ActionRouter,
    tools: Vec<ToolDescription>,
    groups: HashMap<String, String>,
}

impl ToolBox {
    pub fn new(router: ActionRouter) -> Self {
        Self {
            router,
            tools: Vec::new(),
            groups: HashMap::new(),
        }
    }

    /// Expose the functions of `action_group` described by `tools`
    pub fn with_group(mut self, action_group: &str, tools: Vec<ToolDescription>) -> Self {
        for tool in tools {
            self.groups.insert(tool.name.clone(), action_group.to_string());
            self.tools.push(tool);
        }
        self
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "In this environment you have access to a set of tools you can use to answer the user's question.\n\n\
             You may call them like this:\n\
             <function_calls>\n<invoke>\n<tool_name>$TOOL_NAME</tool_name>\n<parameters>\n\
             <$PARAMETER_NAME>$PARAMETER_VALUE</$PARAMETER_NAME>\n...\n</parameters>\n</invoke>\n</function_calls>\n\n\
             Here are the tools available:\n{}",
            tools_xml(&self.tools)
        )
    }

    /// Run one call through its action group and return the response body
    pub async fn call(&self, call: &ToolCall) -> String {
        let Some(group) = self.groups.get(&call.tool_name) else {
            warn!("Model asked for unknown tool {}", call.tool_name);
            return format!("Unknown tool {}", call.tool_name);
        };

        let parameters = call
            .parameters
            .iter()
            .map(|(name, value)| ActionParameter::new(name.as_str(), value.as_str()))
            .collect();
        let event = ActionEvent::function_call(group.as_str(), call.tool_name.as_str(), parameters);
        let envelope = self.router.dispatch(&event).await;
        envelope.body().unwrap_or_default().to_string()
    }
}

fn message(role: &str, text: String) -> ConverseMessage {
    ConverseMessage {
        role: role.to_string(),
        content: vec![ConverseContent::text(text)],
    }
}

/// Converse with tool calls until the model answers without one
///
/// Each reply that requests tools is echoed back as an assistant turn,
/// followed by a user turn holding every function result.
pub async fn run_tool_loop(
    runtime: &dyn ModelRuntime,
    model_id: &str,
    toolbox: &ToolBox,
    input: &str,
    settings: &CompletionSettings,
    max_turns: usize,
) -> Result<String, ToolLoopError> {
    let mut request = ConverseRequest {
        messages: vec![message(role::USER, input.to_string())],
        system: Some(vec![SystemText {
            text: toolbox.system_prompt(),
        }]),
        inference_config: Some(InferenceParameters {
            max_tokens: Some(settings.max_tokens),
            temperature: Some(settings.temperature),
            top_p: None,
            stop_sequences: Some(vec![FUNCTION_CALLS_END.to_string()]),
        }),
        guardrail_config: None,
    };

    for turn in 1..=max_turns {
        let reply = runtime.converse(model_id, &request).await?.text();
        let calls = parse_function_calls(&reply);
        if calls.is_empty() {
            return Ok(reply);
        }

        let mut results = String::new();
        for call in &calls {
            info!("Turn {}: calling {} with {:?}", turn, call.tool_name, call.parameters);
            let output = toolbox.call(call).await;
            debug!("{} returned {}", call.tool_name, output);
            results.push_str(&format_function_results(&call.tool_name, &output));
        }

        let mut assistant = reply;
        if !assistant.trim_end().ends_with(FUNCTION_CALLS_END) {
            assistant.push_str(FUNCTION_CALLS_END);
        }
        request.messages.push(message(role::ASSISTANT, assistant));
        request.messages.push(message(role::USER, results));
    }

    Err(ToolLoopError::TooManyTurns(max_turns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::actions::restaurant_booking::{self, RestaurantBooking};
    use crate::models::bedrock::{ConverseOutput, ConverseResponse};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn weather_tool() -> ToolDescription {
        ToolDescription {
            name: "get_weather".to_string(),
            description: "Current weather for a city".to_string(),
            parameters: vec![ToolParameter::new("city", "string", "City name")],
        }
    }

    fn bookings() -> ToolBox {
        let router = ActionRouter::new().register(Arc::new(RestaurantBooking::in_memory()));
        ToolBox::new(router).with_group(
            restaurant_booking::ACTION_GROUP,
            restaurant_booking::tool_descriptions(),
        )
    }

    fn settings() -> CompletionSettings {
        CompletionSettings {
            temperature: 0.0,
            max_tokens: 256,
            attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    /// Replies from a fixed script and records every request
    struct ScriptedRuntime {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<ConverseRequest>>,
    }

    impl ScriptedRuntime {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelRuntime for ScriptedRuntime {
        async fn converse(
            &self,
            _model_id: &str,
            request: &ConverseRequest,
        ) -> Result<ConverseResponse, BedrockError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self.replies.lock().unwrap().pop().unwrap_or_default();
            Ok(ConverseResponse {
                output: ConverseOutput {
                    message: Some(message(role::ASSISTANT, reply)),
                },
                ..Default::default()
            })
        }

        async fn invoke_model(&self, _model_id: &str, _body: &Value) -> Result<Value, BedrockError> {
            Err(BedrockError::BadRequest("not supported".to_string()))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_tool_description_xml() {
        let xml = weather_tool().to_xml();
        assert!(xml.starts_with("<tool_description>\n<tool_name>get_weather</tool_name>"));
        assert!(xml.contains(
            "<parameter>\n<name>city</name>\n<type>string</type>\n<description>City name</description>\n</parameter>"
        ));
        assert!(xml.ends_with("</parameters>\n</tool_description>"));
    }

    #[test]
    fn test_tools_xml_wraps_all() {
        let xml = tools_xml(&[weather_tool(), weather_tool()]);
        assert!(xml.starts_with("<tools>\n"));
        assert_eq!(xml.matches("<tool_description>").count(), 2);
    }

    #[test]
    fn test_function_results() {
        assert_eq!(
            format_function_results("get_weather", "Sunny, 24C"),
            "\n<function_results>\n<result>\n<tool_name>get_weather</tool_name>\n<stdout>\nSunny, 24C\n</stdout>\n</result>\n</function_results>\n"
        );
    }

    #[test]
    fn test_parse_function_calls() {
        let reply = "Let me check.\n<function_calls>\n<invoke>\n<tool_name>get_weather</tool_name>\n\
                     <parameters>\n<city>Lisbon</city>\n<units>metric</units>\n</parameters>\n</invoke>\n\
                     <invoke>\n<tool_name> list_cities </tool_name>\n</invoke>\n<invoke>\n<parameters/>\n</invoke>\n";
        let calls = parse_function_calls(reply);

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_name, "get_weather");
        assert_eq!(calls[0].parameters["city"], "Lisbon");
        assert_eq!(calls[0].parameters["units"], "metric");
        assert_eq!(calls[1].tool_name, "list_cities");
        assert!(calls[1].parameters.is_empty());

        assert!(parse_function_calls("The weather is sunny.").is_empty());
    }

    #[tokio::test]
    async fn test_toolbox_calls_action_group_functions() {
        let toolbox = bookings();
        let created = toolbox
            .call(&ToolCall {
                tool_name: "create_booking".to_string(),
                parameters: BTreeMap::from([
                    ("date".to_string(), "2024-12-24".to_string()),
                    ("hour".to_string(), "20:00".to_string()),
                    ("num_guests".to_string(), "2".to_string()),
                ]),
            })
            .await;
        let created: Value = serde_json::from_str(&created).unwrap();
        let id = created["booking_id"].as_str().unwrap();

        let details = toolbox
            .call(&ToolCall {
                tool_name: "get_booking_details".to_string(),
                parameters: BTreeMap::from([("booking_id".to_string(), id.to_string())]),
            })
            .await;
        assert!(details.contains("\"hour\":\"20:00\""));

        let unknown = toolbox
            .call(&ToolCall {
                tool_name: "rm_rf".to_string(),
                parameters: BTreeMap::new(),
            })
            .await;
        assert_eq!(unknown, "Unknown tool rm_rf");
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let runtime = ScriptedRuntime::new(&[
            "<function_calls>\n<invoke>\n<tool_name>delete_booking</tool_name>\n\
             <parameters>\n<booking_id>nope1234</booking_id>\n</parameters>\n</invoke>\n",
            "That booking could not be found.",
        ]);
        let answer = run_tool_loop(&runtime, "m", &bookings(), "Cancel nope1234", &settings(), 4)
            .await
            .unwrap();
        assert_eq!(answer, "That booking could not be found.");

        let requests = runtime.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let system = &requests[0].system.as_ref().unwrap()[0].text;
        assert!(system.contains("<tool_name>create_booking</tool_name>"));

        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert!(second[1].content[0].text.as_deref().unwrap().ends_with("</function_calls>"));
        let results = second[2].content[0].text.as_deref().unwrap();
        assert!(results.contains("<tool_name>delete_booking</tool_name>"));
        assert!(results.contains("Failed to delete booking with ID nope1234"));
    }

    #[tokio::test]
    async fn test_tool_loop_gives_up() {
        let call = "<function_calls><invoke><tool_name>get_booking_details</tool_name>\
                    <parameters><booking_id>x</booking_id></parameters></invoke>";
        let runtime = ScriptedRuntime::new(&[call, call]);
        let result = run_tool_loop(&runtime, "m", &bookings(), "?", &settings(), 2).await;
        assert!(matches!(result, Err(ToolLoopError::TooManyTurns(2))));
    }
}
