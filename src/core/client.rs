//! Bedrock HTTP client with fixed-attempt retries
//!
//! This module provides an async HTTP client for the Bedrock control plane,
//! runtime, agent and agent-runtime services. Requests are authenticated with
//! a Bedrock API key sent as a bearer token. Retryable failures are repeated
//! a fixed number of times with a fixed delay.

use crate::core::config::Config;
use crate::core::provider::{BedrockError, ModelRuntime};
use crate::models::bedrock::{ConverseRequest, ConverseResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Bedrock service families, each with its own endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// `bedrock`: customization jobs, provisioned throughput, model listing
    Control,
    /// `bedrock-runtime`: invoke, converse, async invoke, guardrails
    Runtime,
    /// `bedrock-agent`: knowledge bases and data sources
    Agent,
    /// `bedrock-agent-runtime`: agent invocation and retrieval
    AgentRuntime,
}

/// Base URLs for every service family
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEndpoints {
    pub control: String,
    pub runtime: String,
    pub agent: String,
    pub agent_runtime: String,
}

impl ServiceEndpoints {
    /// Public endpoints for a region
    pub fn for_region(region: &str) -> Self {
        Self {
            control: format!("https://bedrock.{region}.amazonaws.com"),
            runtime: format!("https://bedrock-runtime.{region}.amazonaws.com"),
            agent: format!("https://bedrock-agent.{region}.amazonaws.com"),
            agent_runtime: format!("https://bedrock-agent-runtime.{region}.amazonaws.com"),
        }
    }

    /// Region endpoints with any configured overrides applied
    pub fn from_config(config: &Config) -> Self {
        let mut endpoints = Self::for_region(&config.region);
        if let Some(url) = &config.bedrock_url {
            endpoints.control = url.clone();
        }
        if let Some(url) = &config.runtime_url {
            endpoints.runtime = url.clone();
        }
        if let Some(url) = &config.agent_url {
            endpoints.agent = url.clone();
        }
        if let Some(url) = &config.agent_runtime_url {
            endpoints.agent_runtime = url.clone();
        }
        endpoints
    }

    /// All services behind one base URL
    pub fn uniform(base_url: &str) -> Self {
        Self {
            control: base_url.to_string(),
            runtime: base_url.to_string(),
            agent: base_url.to_string(),
            agent_runtime: base_url.to_string(),
        }
    }

    pub fn base(&self, service: Service) -> &str {
        match service {
            Service::Control => &self.control,
            Service::Runtime => &self.runtime,
            Service::Agent => &self.agent,
            Service::AgentRuntime => &self.agent_runtime,
        }
    }
}

/// Bedrock client shared by every remote helper
#[derive(Clone)]
pub struct BedrockClient {
    client: Client,
    api_key: String,
    endpoints: ServiceEndpoints,
    max_retries: u32,
    retry_delay: Duration,
}

impl BedrockClient {
    /// Create a new Bedrock client
    ///
    /// # Arguments
    ///
    /// * `api_key` - Bedrock API key
    /// * `endpoints` - Service base URLs
    /// * `timeout` - Request timeout in seconds
    /// * `max_retries` - Extra attempts for retryable failures
    /// * `retry_delay` - Fixed delay between attempts
    pub fn new(
        api_key: String,
        endpoints: ServiceEndpoints,
        timeout: u64,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self, BedrockError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| BedrockError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoints,
            max_retries,
            retry_delay,
        })
    }

    /// Create a client from application configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("No Bedrock API key configured (set aws.api_key or AWS_BEARER_TOKEN_BEDROCK)")?;

        Ok(Self::new(
            api_key,
            ServiceEndpoints::from_config(config),
            config.request_timeout,
            config.max_retries,
            Duration::from_secs(config.retry_delay_secs),
        )?)
    }

    /// Same connection pool and endpoints with a different retry count
    ///
    /// Callers that run their own attempt loop use `with_max_retries(0)` so
    /// a failing request is not retried at two levels.
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self.clone()
        }
    }

    /// Build a service URL from path segments
    ///
    /// Every segment is percent-encoded on its own, so ARNs containing `/`
    /// stay a single path segment.
    pub(crate) fn url(
        &self,
        service: Service,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, BedrockError> {
        let base = self.endpoints.base(service);
        let mut url = Url::parse(base)
            .map_err(|e| BedrockError::BadRequest(format!("Invalid endpoint {base}: {e}")))?;

        url.path_segments_mut()
            .map_err(|_| BedrockError::BadRequest(format!("Endpoint {base} cannot take a path")))?
            .pop_if_empty()
            .extend(segments);

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    /// GET a JSON resource
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: Service,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, BedrockError> {
        let url = self.url(service, segments, query)?;
        let response = self.send_with_retries(Method::GET, url, None).await?;
        Self::decode(response).await
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: Service,
        segments: &[&str],
        body: &B,
    ) -> Result<T, BedrockError> {
        let url = self.url(service, segments, &[])?;
        let body = Self::encode(body)?;
        let response = self.send_with_retries(Method::POST, url, Some(&body)).await?;
        Self::decode(response).await
    }

    /// PUT a JSON body and decode the JSON response
    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: Service,
        segments: &[&str],
        body: &B,
    ) -> Result<T, BedrockError> {
        let url = self.url(service, segments, &[])?;
        let body = Self::encode(body)?;
        let response = self.send_with_retries(Method::PUT, url, Some(&body)).await?;
        Self::decode(response).await
    }

    /// POST a JSON body and hand back the raw response for streaming
    pub async fn post_stream<B: Serialize + ?Sized>(
        &self,
        service: Service,
        segments: &[&str],
        body: &B,
    ) -> Result<reqwest::Response, BedrockError> {
        let url = self.url(service, segments, &[])?;
        let body = Self::encode(body)?;
        self.send_with_retries(Method::POST, url, Some(&body)).await
    }

    fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, BedrockError> {
        serde_json::to_value(body)
            .map_err(|e| BedrockError::BadRequest(format!("Failed to encode request: {e}")))
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BedrockError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| BedrockError::Decode(format!("Failed to parse response: {e}")))
    }

    async fn send_with_retries(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, BedrockError> {
        let mut attempt = 0;
        loop {
            match self.send_once(method.clone(), url.clone(), body).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} {}: attempt {} failed: {}. Retrying after {:?}",
                        method,
                        url.path(),
                        attempt,
                        error,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, BedrockError> {
        debug!("{} {}", method, url);

        let mut req_builder = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json");

        if let Some(body) = body {
            req_builder = req_builder.json(body);
        }

        let response = req_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BedrockError::from_status(
                status.as_u16(),
                Self::classify_error(&error_text),
            ));
        }

        Ok(response)
    }

    /// Classify service errors and provide helpful messages
    fn classify_error(error_detail: &str) -> String {
        let error_lower = error_detail.to_lowercase();

        if error_lower.contains("expiredtoken") || error_lower.contains("token has expired") {
            return "Bedrock API key has expired. Generate a new key and update AWS_BEARER_TOKEN_BEDROCK.".to_string();
        }

        if error_lower.contains("accessdenied") || error_lower.contains("not authorized") {
            return "Access denied. Check the key's permissions and that model access is enabled in this region.".to_string();
        }

        if error_lower.contains("throttling") || error_lower.contains("too many requests") {
            return "Request was throttled. Reduce concurrency or request a quota increase."
                .to_string();
        }

        if error_lower.contains("model")
            && (error_lower.contains("not found")
                || error_lower.contains("does not exist")
                || error_lower.contains("invalid model identifier"))
        {
            return "Model not found. Check the model id and that it is available in this region."
                .to_string();
        }

        // Service errors carry the detail in a `message` field
        serde_json::from_str::<Value>(error_detail)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .or_else(|| value.get("Message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| error_detail.to_string())
    }
}

#[async_trait]
impl ModelRuntime for BedrockClient {
    async fn converse(
        &self,
        model_id: &str,
        request: &ConverseRequest,
    ) -> Result<ConverseResponse, BedrockError> {
        self.post_json(Service::Runtime, &["model", model_id, "converse"], request)
            .await
    }

    async fn invoke_model(&self, model_id: &str, body: &Value) -> Result<Value, BedrockError> {
        self.post_json(Service::Runtime, &["model", model_id, "invoke"], body)
            .await
    }

    fn provider_name(&self) -> &str {
        "Amazon Bedrock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bedrock::{ConverseContent, ConverseMessage};

    fn test_client(base_url: &str, max_retries: u32) -> BedrockClient {
        BedrockClient::new(
            "test-key".to_string(),
            ServiceEndpoints::uniform(base_url),
            5,
            max_retries,
            Duration::from_millis(0),
        )
        .unwrap()
    }

    fn hello_request() -> ConverseRequest {
        ConverseRequest {
            messages: vec![ConverseMessage {
                role: "user".to_string(),
                content: vec![ConverseContent::text("Hello")],
            }],
            system: None,
            inference_config: None,
            guardrail_config: None,
        }
    }

    #[test]
    fn test_classify_expired_token() {
        let result = BedrockClient::classify_error("ExpiredTokenException: token has expired");
        assert!(result.contains("expired"));
    }

    #[test]
    fn test_classify_extracts_message_field() {
        let result = BedrockClient::classify_error(r#"{"message":"Malformed input request"}"#);
        assert_eq!(result, "Malformed input request");
    }

    #[test]
    fn test_endpoints_for_region() {
        let endpoints = ServiceEndpoints::for_region("eu-west-1");
        assert_eq!(endpoints.runtime, "https://bedrock-runtime.eu-west-1.amazonaws.com");
        assert_eq!(
            endpoints.base(Service::AgentRuntime),
            "https://bedrock-agent-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_url_encodes_arn_segment() {
        let client = test_client("https://bedrock.us-east-1.amazonaws.com", 0);
        let url = client
            .url(
                Service::Control,
                &[
                    "model-customization-jobs",
                    "arn:aws:bedrock:us-east-1:123456789012:model-customization-job/abc",
                ],
                &[],
            )
            .unwrap();
        assert_eq!(
            url.path(),
            "/model-customization-jobs/arn:aws:bedrock:us-east-1:123456789012:model-customization-job%2Fabc"
        );
    }

    #[test]
    fn test_url_with_query() {
        let client = test_client("http://localhost:1234", 0);
        let url = client
            .url(Service::Runtime, &["async-invoke"], &[("statusEquals", "InProgress")])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:1234/async-invoke?statusEquals=InProgress");
    }

    #[tokio::test]
    async fn test_converse_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/model/amazon.nova-lite-v1:0/converse")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "output": {"message": {"role": "assistant", "content": [{"text": "Hi!"}]}},
                    "usage": {"inputTokens": 4, "outputTokens": 2, "totalTokens": 6},
                    "stopReason": "end_turn"
                }"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url(), 0);
        let response = client
            .converse("amazon.nova-lite-v1:0", &hello_request())
            .await
            .unwrap();

        assert_eq!(response.text(), "Hi!");
        assert_eq!(response.usage.total_tokens, 6);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/model/amazon.nova-lite-v1:0/converse")
            .with_status(400)
            .with_body(r#"{"message":"Malformed input request"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 3);
        let error = client
            .converse("amazon.nova-lite-v1:0", &hello_request())
            .await
            .unwrap_err();

        match error {
            BedrockError::BadRequest(message) => assert_eq!(message, "Malformed input request"),
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/foundation-models")
            .with_status(503)
            .with_body("Service Unavailable")
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server.url(), 2);
        let error = client
            .get_json::<Value>(Service::Control, &["foundation-models"], &[])
            .await
            .unwrap_err();

        assert!(matches!(error, BedrockError::ApiError { status: 503, .. }));
        mock.assert_async().await;
    }
}
