//! Guardrail evaluation
//!
//! A guardrail can be applied on its own to a piece of text, or attached to
//! a Converse call so the model's input and output are screened in line.

use crate::core::client::{BedrockClient, Service};
use crate::core::provider::{BedrockError, ModelRuntime};
use crate::inference::converse::user_messages;
use crate::models::bedrock::{
    ApplyGuardrailRequest, ApplyGuardrailResponse, ConverseRequest, ConverseResponse,
    GuardrailConfig, GuardrailContent, GuardrailText,
};
use tracing::info;

const INTERVENED: &str = "GUARDRAIL_INTERVENED";
const STOP_REASON_INTERVENED: &str = "guardrail_intervened";

/// Which side of a conversation the text comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardrailSource {
    Input,
    Output,
}

impl GuardrailSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailSource::Input => "INPUT",
            GuardrailSource::Output => "OUTPUT",
        }
    }
}

/// Outcome of a standalone guardrail check
#[derive(Debug, Clone)]
pub struct GuardrailVerdict {
    pub action: String,
    pub outputs: Vec<String>,
    pub response: ApplyGuardrailResponse,
}

impl GuardrailVerdict {
    pub fn intervened(&self) -> bool {
        self.action == INTERVENED
    }
}

/// Evaluate `text` against a guardrail version
pub async fn apply_guardrail(
    client: &BedrockClient,
    guardrail_id: &str,
    version: &str,
    source: GuardrailSource,
    text: &str,
) -> Result<GuardrailVerdict, BedrockError> {
    let request = ApplyGuardrailRequest {
        source: source.as_str().to_string(),
        content: vec![GuardrailContent {
            text: GuardrailText {
                text: text.to_string(),
            },
        }],
    };

    let response: ApplyGuardrailResponse = client
        .post_json(
            Service::Runtime,
            &["guardrail", guardrail_id, "version", version, "apply"],
            &request,
        )
        .await?;

    info!("Guardrail {} v{} action: {}", guardrail_id, version, response.action);
    Ok(GuardrailVerdict {
        action: response.action.clone(),
        outputs: response.outputs.iter().map(|o| o.text.clone()).collect(),
        response,
    })
}

/// Converse call screened by a guardrail
///
/// Returns the response and whether the guardrail intervened.
pub async fn converse_with_guardrail(
    runtime: &dyn ModelRuntime,
    model_id: &str,
    prompt: &str,
    guardrail: GuardrailConfig,
) -> Result<(ConverseResponse, bool), BedrockError> {
    let request = ConverseRequest {
        messages: user_messages(prompt),
        system: None,
        inference_config: None,
        guardrail_config: Some(guardrail),
    };

    let response = runtime.converse(model_id, &request).await?;
    let intervened = response.stop_reason.as_deref() == Some(STOP_REASON_INTERVENED);
    Ok((response, intervened))
}
