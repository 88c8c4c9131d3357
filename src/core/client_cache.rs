//! Process-wide cache of the Bedrock client and default model ids
//!
//! Helpers that need a client share one instance. A client can be injected
//! (tests, custom endpoints); otherwise it is created from configuration on
//! first use and reused afterwards.

use crate::core::client::BedrockClient;
use crate::core::config::Config;
use anyhow::Result;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::info;

/// Default text model id
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-v2";

/// Default embeddings model id
pub const DEFAULT_EMBEDDINGS_MODEL_ID: &str = "amazon.titan-embed-text-v1";

struct CacheState {
    client: Option<Arc<BedrockClient>>,
    model_id: String,
    embeddings_model_id: String,
}

/// Shared client and model settings
pub struct ClientCache {
    state: RwLock<CacheState>,
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState {
                client: None,
                model_id: DEFAULT_MODEL_ID.to_string(),
                embeddings_model_id: DEFAULT_EMBEDDINGS_MODEL_ID.to_string(),
            }),
        }
    }

    /// The process-wide instance
    pub fn global() -> &'static ClientCache {
        static GLOBAL: OnceLock<ClientCache> = OnceLock::new();
        GLOBAL.get_or_init(ClientCache::new)
    }

    /// Install or create the cached client
    ///
    /// An injected client always replaces the cached one. Without one, an
    /// existing client is kept and a missing one is built from `config`.
    pub async fn init_client(
        &self,
        client: Option<Arc<BedrockClient>>,
        config: &Config,
    ) -> Result<Arc<BedrockClient>> {
        let mut state = self.state.write().await;

        if let Some(client) = client {
            state.client = Some(client.clone());
            return Ok(client);
        }

        if let Some(existing) = &state.client {
            return Ok(existing.clone());
        }

        info!("Creating Bedrock client for region {}", config.region);
        let created = Arc::new(BedrockClient::from_config(config)?);
        state.client = Some(created.clone());
        Ok(created)
    }

    /// Cached client, creating it from `config` when absent
    pub async fn client(&self, config: &Config) -> Result<Arc<BedrockClient>> {
        if let Some(client) = &self.state.read().await.client {
            return Ok(client.clone());
        }
        self.init_client(None, config).await
    }

    pub async fn model_id(&self) -> String {
        self.state.read().await.model_id.clone()
    }

    /// Replace the default text model id; `None` keeps the current one
    pub async fn set_model_id(&self, model_id: Option<&str>) {
        if let Some(model_id) = model_id.filter(|id| !id.is_empty()) {
            self.state.write().await.model_id = model_id.to_string();
        }
    }

    /// Embeddings model id, replacing the stored one when an override is given
    pub async fn embeddings_model_id(&self, override_id: Option<&str>) -> String {
        let mut state = self.state.write().await;
        if let Some(model_id) = override_id.filter(|id| !id.is_empty()) {
            state.embeddings_model_id = model_id.to_string();
        }
        state.embeddings_model_id.clone()
    }
}
