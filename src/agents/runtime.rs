//! Agent invocation
//!
//! `InvokeAgent` answers with an event stream: zero or more trace events
//! and chunk events carrying base64 text. The chunks are decoded and joined
//! into the final answer.

use crate::agents::eventstream::{EventStreamDecoder, EventStreamError, Message};
use crate::core::client::{BedrockClient, Service};
use crate::core::provider::BedrockError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Bedrock(#[from] BedrockError),

    #[error(transparent)]
    EventStream(#[from] EventStreamError),

    #[error("Agent stream reported {kind}: {message}")]
    Stream { kind: String, message: String },

    #[error("Unexpected event type '{0}'")]
    UnexpectedEvent(String),

    #[error("Malformed {event} event: {reason}")]
    Malformed { event: String, reason: String },
}

/// Event decoded from an agent response stream
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Chunk(String),
    Trace(Value),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvokeAgentBody<'a> {
    input_text: &'a str,
    enable_trace: bool,
    end_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_state: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    bytes: String,
}

/// Joined chunk text plus every trace received
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentAnswer {
    pub text: String,
    pub traces: Vec<Value>,
}

fn malformed(event: &str, reason: impl ToString) -> AgentError {
    AgentError::Malformed {
        event: event.to_string(),
        reason: reason.to_string(),
    }
}

/// Interpret one event-stream frame
pub fn decode_event(message: &Message) -> Result<AgentEvent, AgentError> {
    let payload = String::from_utf8_lossy(&message.payload).into_owned();

    match message.header_str(":message-type") {
        Some("exception") => {
            let kind = message.header_str(":exception-type").unwrap_or("exception");
            return Err(AgentError::Stream {
                kind: kind.to_string(),
                message: payload,
            });
        }
        Some("error") => {
            let kind = message.header_str(":error-code").unwrap_or("error");
            let detail = message.header_str(":error-message").map(str::to_string);
            return Err(AgentError::Stream {
                kind: kind.to_string(),
                message: detail.unwrap_or(payload),
            });
        }
        _ => {}
    }

    match message.header_str(":event-type") {
        Some("chunk") => {
            let chunk: ChunkPayload =
                serde_json::from_slice(&message.payload).map_err(|e| malformed("chunk", e))?;
            let bytes = STANDARD.decode(chunk.bytes).map_err(|e| malformed("chunk", e))?;
            let text = String::from_utf8(bytes).map_err(|e| malformed("chunk", e))?;
            Ok(AgentEvent::Chunk(text))
        }
        Some("trace") => {
            let mut value: Value =
                serde_json::from_slice(&message.payload).map_err(|e| malformed("trace", e))?;
            let trace = value.get_mut("trace").map(Value::take).unwrap_or(value);
            Ok(AgentEvent::Trace(trace))
        }
        other => Err(AgentError::UnexpectedEvent(other.unwrap_or("<none>").to_string())),
    }
}

/// Fold decoded events into an answer
pub fn collect_events(
    events: impl IntoIterator<Item = AgentEvent>,
    enable_trace: bool,
) -> AgentAnswer {
    let mut answer = AgentAnswer::default();
    for event in events {
        match event {
            AgentEvent::Chunk(text) => {
                if enable_trace {
                    info!("Final answer ->\n{}", text);
                }
                answer.text.push_str(&text);
            }
            AgentEvent::Trace(trace) => {
                if enable_trace {
                    info!("{}", serde_json::to_string_pretty(&trace).unwrap_or_default());
                }
                answer.traces.push(trace);
            }
        }
    }
    answer
}

/// Send `input` to an agent alias and wait for the complete answer
///
/// # Arguments
///
/// * `session_id` - Conversation id; reuse it to continue a session
/// * `enable_trace` - Ask for trace events and log them as they arrive
/// * `session_state` - Optional `sessionState` object passed through unchanged
pub async fn invoke_agent(
    client: &BedrockClient,
    agent_id: &str,
    alias_id: &str,
    session_id: &str,
    input: &str,
    enable_trace: bool,
    session_state: Option<&Value>,
) -> Result<AgentAnswer, AgentError> {
    let body = InvokeAgentBody {
        input_text: input,
        enable_trace,
        end_session: false,
        session_state,
    };

    let response = client
        .post_stream(
            Service::AgentRuntime,
            &["agents", agent_id, "agentAliases", alias_id, "sessions", session_id, "text"],
            &body,
        )
        .await?;

    let mut stream = agent_events(response.bytes_stream());
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        let event = event?;
        debug!("Agent event: {:?}", event);
        events.push(event);
    }

    Ok(collect_events(events, enable_trace))
}

/// Decode a raw event-stream body into agent events
///
/// The stream ends after the first error.
pub fn agent_events<S, B, E>(
    bytes: S,
) -> Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Send,
    BedrockError: From<E>,
{
    let stream = async_stream::stream! {
        let mut decoder = EventStreamDecoder::new();
        futures::pin_mut!(bytes);

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => decoder.push(chunk.as_ref()),
                Err(e) => {
                    yield Err(AgentError::from(BedrockError::from(e)));
                    return;
                }
            }

            loop {
                match decoder.next_message() {
                    Ok(Some(message)) => {
                        let event = decode_event(&message);
                        let failed = event.is_err();
                        yield event;
                        if failed {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(AgentError::from(e));
                        return;
                    }
                }
            }
        }

        if let Err(e) = decoder.finish() {
            yield Err(AgentError::from(e));
        }
    };

    Box::pin(stream)
}

/// A `text` value found in a trace with up to two of its parent keys
#[derive(Debug, Clone, PartialEq)]
pub struct TextWithParents {
    pub parents: Vec<String>,
    pub text: String,
}

/// Every `text` field in `value`, tagged with its two nearest parent keys
pub fn text_with_parents(value: &Value) -> Vec<TextWithParents> {
    fn walk(value: &Value, path: &mut Vec<String>, found: &mut Vec<TextWithParents>) {
        match value {
            Value::Object(map) => walk_object(map, path, found),
            Value::Array(items) => items.iter().for_each(|item| walk(item, path, found)),
            _ => {}
        }
    }

    fn walk_object(map: &Map<String, Value>, path: &mut Vec<String>, found: &mut Vec<TextWithParents>) {
        for (key, child) in map {
            if key == "text" {
                let start = path.len().saturating_sub(2);
                found.push(TextWithParents {
                    parents: path[start..].to_vec(),
                    text: child.as_str().map(str::to_string).unwrap_or_else(|| child.to_string()),
                });
            } else {
                path.push(key.clone());
                walk(child, path, found);
                path.pop();
            }
        }
    }

    let mut found = Vec::new();
    walk(value, &mut Vec::new(), &mut found);
    found
}
