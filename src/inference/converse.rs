//! Single-prompt inference with retries

use crate::core::config::Config;
use crate::core::constants::{API_ERROR_OUTPUT, role};
use crate::core::provider::ModelRuntime;
use crate::models::bedrock::{
    ConverseContent, ConverseMessage, ConverseRequest, InferenceParameters, TokenUsage,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sampling and retry settings for one completion
#[derive(Debug, Clone, Copy)]
pub struct CompletionSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl CompletionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            attempts: config.max_retries + 1,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }
}

/// Model output plus wall-clock latency and token usage
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub latency: Duration,
    pub usage: TokenUsage,
}

impl Completion {
    fn failed() -> Self {
        Self {
            text: API_ERROR_OUTPUT.to_string(),
            latency: Duration::ZERO,
            usage: TokenUsage::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.text == API_ERROR_OUTPUT
    }
}

/// A one-turn conversation holding `prompt` as the user message
pub fn user_messages(prompt: &str) -> Vec<ConverseMessage> {
    vec![ConverseMessage {
        role: role::USER.to_string(),
        content: vec![ConverseContent::text(prompt)],
    }]
}

/// Send `prompt` to `model_id`, trying up to `settings.attempts` times
///
/// Never fails: when every attempt errors the returned completion carries
/// the `$ERROR$` marker with zero usage. This is the only retry loop; pass a
/// `BedrockClient` built with `with_max_retries(0)`.
pub async fn chat_completion(
    runtime: &dyn ModelRuntime,
    model_id: &str,
    prompt: &str,
    settings: &CompletionSettings,
) -> Completion {
    let request = ConverseRequest {
        messages: user_messages(prompt),
        system: None,
        inference_config: Some(InferenceParameters {
            max_tokens: Some(settings.max_tokens),
            temperature: Some(settings.temperature),
            top_p: None,
            stop_sequences: None,
        }),
        guardrail_config: None,
    };

    for attempt in 1..=settings.attempts.max(1) {
        let started = Instant::now();
        match runtime.converse(model_id, &request).await {
            Ok(response) => {
                let latency = started.elapsed();
                debug!(
                    "{} answered in {:?} ({} tokens)",
                    model_id, latency, response.usage.total_tokens
                );
                return Completion {
                    text: response.text(),
                    latency,
                    usage: response.usage,
                };
            }
            Err(e) => {
                warn!(
                    "{} call to {} failed (attempt {}/{}): {}",
                    runtime.provider_name(),
                    model_id,
                    attempt,
                    settings.attempts,
                    e
                );
                if attempt < settings.attempts {
                    tokio::time::sleep(settings.retry_delay).await;
                }
            }
        }
    }

    Completion::failed()
}
