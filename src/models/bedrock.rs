//! Bedrock service data models
//!
//! Request and response structures for the control plane (model
//! customization, provisioned throughput, foundation models) and the runtime
//! (Converse, async invoke, guardrails).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::AddAssign;

/// Text content block in a Converse message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConverseContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ConverseContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Converse message with role and content blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverseMessage {
    pub role: String,
    pub content: Vec<ConverseContent>,
}

/// System prompt block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemText {
    pub text: String,
}

/// Inference parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Guardrail attached to a Converse call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailConfig {
    pub guardrail_identifier: String,
    pub guardrail_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Converse API request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    pub messages: Vec<ConverseMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemText>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_config: Option<InferenceParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_config: Option<GuardrailConfig>,
}

/// Token usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConverseOutput {
    #[serde(default)]
    pub message: Option<ConverseMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseMetrics {
    #[serde(default)]
    pub latency_ms: u64,
}

/// Converse API response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseResponse {
    #[serde(default)]
    pub output: ConverseOutput,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub metrics: Option<ConverseMetrics>,
}

impl ConverseResponse {
    /// Concatenated text of the output message
    pub fn text(&self) -> String {
        self.output
            .message
            .as_ref()
            .map(|message| {
                message
                    .content
                    .iter()
                    .filter_map(|block| block.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

/// S3 location wrapper used by customization jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3DataConfig {
    pub s3_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDataConfig {
    pub validators: Vec<S3DataConfig>,
}

/// Model customization job creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomizationJobRequest {
    pub job_name: String,
    pub custom_model_name: String,
    pub role_arn: String,
    pub base_model_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customization_type: Option<String>,
    pub training_data_config: S3DataConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_data_config: Option<ValidationDataConfig>,
    pub output_data_config: S3DataConfig,
    pub hyper_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomizationJobResponse {
    pub job_arn: String,
}

/// Customization job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomizationStatus {
    InProgress,
    Completed,
    Failed,
    Stopping,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Customization job details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationJob {
    pub job_arn: String,
    #[serde(default)]
    pub job_name: Option<String>,
    pub status: CustomizationStatus,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub output_model_arn: Option<String>,
    #[serde(default)]
    pub output_model_name: Option<String>,
    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Provisioned throughput creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedThroughputRequest {
    pub model_units: u32,
    pub provisioned_model_name: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedThroughputResponse {
    pub provisioned_model_arn: String,
}

/// Foundation model listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundationModelSummary {
    pub model_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
    #[serde(default)]
    pub customizations_supported: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundationModelsResponse {
    #[serde(default)]
    pub model_summaries: Vec<FoundationModelSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3OutputDataConfig {
    pub s3_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOutputDataConfig {
    pub s3_output_data_config: S3OutputDataConfig,
}

impl AsyncOutputDataConfig {
    pub fn s3(uri: impl Into<String>) -> Self {
        Self {
            s3_output_data_config: S3OutputDataConfig { s3_uri: uri.into() },
        }
    }
}

/// Async invoke submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAsyncInvokeRequest {
    pub model_id: String,
    pub model_input: Value,
    pub output_data_config: AsyncOutputDataConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_request_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAsyncInvokeResponse {
    pub invocation_arn: String,
}

/// Async invoke status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncInvokeStatus {
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl AsyncInvokeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncInvokeStatus::InProgress => "InProgress",
            AsyncInvokeStatus::Completed => "Completed",
            AsyncInvokeStatus::Failed => "Failed",
            AsyncInvokeStatus::Unknown => "Unknown",
        }
    }
}

/// Async invoke job as returned by get and list
///
/// Unrecognised fields are kept so the job can be written back to disk
/// unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncInvokeJob {
    pub invocation_arn: String,
    pub status: AsyncInvokeStatus,
    pub submit_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub output_data_config: AsyncOutputDataConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAsyncInvokesResponse {
    #[serde(default)]
    pub async_invoke_summaries: Vec<AsyncInvokeJob>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailText {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailContent {
    pub text: GuardrailText,
}

/// Standalone guardrail evaluation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyGuardrailRequest {
    pub source: String,
    pub content: Vec<GuardrailContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailOutput {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyGuardrailResponse {
    pub action: String,
    #[serde(default)]
    pub outputs: Vec<GuardrailOutput>,
    #[serde(default)]
    pub assessments: Vec<Value>,
    #[serde(default)]
    pub usage: Option<Value>,
}
