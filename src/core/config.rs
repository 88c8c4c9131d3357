//! Application configuration management
//!
//! This module handles loading and validating configuration from TOML files.
//! Every section is optional; missing values fall back to defaults so the
//! offline commands (validation, conversion) run without any configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Default request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT: u64 = 90;

/// Default number of extra attempts for retryable failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between attempts
const DEFAULT_RETRY_DELAY_SECS: u64 = 3;

/// Default interval between job-status polls
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default server port
const DEFAULT_PORT: u16 = 8082;

/// Default region when neither config nor environment specify one
const DEFAULT_REGION: &str = "us-east-1";

/// Environment variable carrying the Bedrock API key
pub const API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub bedrock_url: Option<String>,
    #[serde(default)]
    pub runtime_url: Option<String>,
    #[serde(default)]
    pub agent_url: Option<String>,
    #[serde(default)]
    pub agent_runtime_url: Option<String>,
    #[serde(default)]
    pub s3_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
    /// Upper bound on a single wait; unbounded when absent
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_wait_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FineTuneConfig {
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default = "default_base_model")]
    pub base_model: String,
    #[serde(default = "default_hyper_parameters")]
    pub hyper_parameters: HashMap<String, String>,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            role_arn: None,
            base_model: default_base_model(),
            hyper_parameters: default_hyper_parameters(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_models")]
    pub models: HashMap<String, String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            models: default_models(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_base_model() -> String {
    "arn:aws:bedrock:us-east-1::foundation-model/amazon.nova-lite-v1:0:300k".to_string()
}

fn default_hyper_parameters() -> HashMap<String, String> {
    HashMap::from([
        ("epochCount".to_string(), "1".to_string()),
        ("learningRate".to_string(), "1e-6".to_string()),
        ("batchSize".to_string(), "1".to_string()),
    ])
}

fn default_workers() -> usize {
    2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_models() -> HashMap<String, String> {
    HashMap::from([
        ("aws_nova_lite_v1".to_string(), "amazon.nova-lite-v1:0".to_string()),
        ("aws_nova_pro_v1".to_string(), "amazon.nova-pro-v1:0".to_string()),
        ("aws_nova_micro_v1".to_string(), "amazon.nova-micro-v1:0".to_string()),
    ])
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub finetune: FineTuneConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Application configuration
///
/// Values from the TOML file take precedence; region and API key fall back
/// to the standard environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region used to derive service endpoints
    pub region: String,

    /// Bedrock API key sent as a bearer token
    pub api_key: Option<String>,

    /// Endpoint overrides (mainly for testing and private endpoints)
    pub bedrock_url: Option<String>,
    pub runtime_url: Option<String>,
    pub agent_url: Option<String>,
    pub agent_runtime_url: Option<String>,
    pub s3_url: Option<String>,

    /// Request timeout in seconds
    pub request_timeout: u64,

    /// Extra attempts for retryable failures
    pub max_retries: u32,

    /// Fixed delay between attempts in seconds
    pub retry_delay_secs: u64,

    /// Job-status polling
    pub poll_interval_secs: u64,
    pub poll_max_wait_secs: Option<u64>,

    /// Fine-tuning defaults
    pub role_arn: Option<String>,
    pub base_model: String,
    pub hyper_parameters: HashMap<String, String>,

    /// Batch inference defaults
    pub workers: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub models: HashMap<String, String>,

    /// Action-group server
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default())
    }
}

impl Config {
    fn from_toml(config: TomlConfig) -> Self {
        let region = config
            .aws
            .region
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let api_key = config
            .aws
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty());

        Config {
            region,
            api_key,
            bedrock_url: config.aws.bedrock_url,
            runtime_url: config.aws.runtime_url,
            agent_url: config.aws.agent_url,
            agent_runtime_url: config.aws.agent_runtime_url,
            s3_url: config.aws.s3_url,
            request_timeout: config.request.request_timeout,
            max_retries: config.request.max_retries,
            retry_delay_secs: config.request.retry_delay_secs,
            poll_interval_secs: config.polling.interval_secs,
            poll_max_wait_secs: config.polling.max_wait_secs,
            role_arn: config.finetune.role_arn,
            base_model: config.finetune.base_model,
            hyper_parameters: config.finetune.hyper_parameters,
            workers: config.inference.workers.max(1),
            max_tokens: config.inference.max_tokens,
            temperature: config.inference.temperature,
            models: config.inference.models,
            host: config.server.host,
            port: config.server.port,
            log_level: config.server.log_level,
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the TOML file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config: TomlConfig =
            toml::from_str(&content).context("Failed to parse TOML configuration")?;

        Ok(Self::from_toml(config))
    }

    /// Load configuration from `CONFIG_PATH` (default `config.toml`)
    ///
    /// An explicitly set `CONFIG_PATH` must exist. The implicit default file
    /// is optional and defaults apply when it is missing.
    pub fn from_env() -> Result<Self> {
        match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::from_file(path),
            Err(_) if Path::new("config.toml").exists() => Self::from_file("config.toml"),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Whether a usable API key is configured
    pub fn validate_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.trim().is_empty())
    }

    /// Map a model alias to its model id; unknown aliases pass through
    pub fn resolve_model(&self, alias: &str) -> String {
        self.models
            .get(alias)
            .cloned()
            .unwrap_or_else(|| alias.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_config() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [aws]
            region = "us-west-2"
            api_key = "bedrock-api-key-test"
            runtime_url = "http://localhost:9000"

            [request]
            request_timeout = 30
            max_retries = 1
            retry_delay_secs = 0

            [polling]
            interval_secs = 5
            max_wait_secs = 600

            [finetune]
            role_arn = "arn:aws:iam::123456789012:role/ft-role"
            base_model = "amazon.nova-micro-v1:0:128k"

            [finetune.hyper_parameters]
            epochCount = "2"

            [inference]
            workers = 4
            temperature = 0.5

            [inference.models]
            ft_model = "arn:aws:bedrock:us-west-2:123456789012:provisioned-model/abc"

            [server]
            port = 9090
            log_level = "debug"
        "#
        )
        .unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_config() {
        let file = create_test_config();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.api_key.as_deref(), Some("bedrock-api-key-test"));
        assert_eq!(config.runtime_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.poll_max_wait_secs, Some(600));
        assert_eq!(config.base_model, "amazon.nova-micro-v1:0:128k");
        assert_eq!(config.hyper_parameters.get("epochCount").unwrap(), "2");
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_validate_api_key() {
        let file = create_test_config();
        let config = Config::from_file(file.path()).unwrap();
        assert!(config.validate_api_key());

        let mut missing = config.clone();
        missing.api_key = None;
        assert!(!missing.validate_api_key());
    }

    #[test]
    fn test_resolve_model() {
        let file = create_test_config();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.resolve_model("ft_model"),
            "arn:aws:bedrock:us-west-2:123456789012:provisioned-model/abc"
        );
        assert_eq!(
            config.resolve_model("amazon.nova-pro-v1:0"),
            "amazon.nova-pro-v1:0"
        );
    }

    #[test]
    fn test_defaults_without_sections() {
        let config = Config::from_toml(TomlConfig::default());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.workers, 2);
        assert_eq!(
            config.resolve_model("aws_nova_lite_v1"),
            "amazon.nova-lite-v1:0"
        );
        assert_eq!(config.hyper_parameters.len(), 3);
    }
}
