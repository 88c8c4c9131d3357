//! Text-to-image generation (Nova Canvas)

use crate::core::provider::{BedrockError, ModelRuntime};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const TEXT_IMAGE: &str = "TEXT_IMAGE";

#[derive(Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Bedrock(#[from] BedrockError),

    #[error("Image generation failed: {0}")]
    Generation(String),

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToImageParams {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationConfig {
    pub number_of_images: u32,
    pub height: u32,
    pub width: u32,
    pub cfg_scale: f32,
    pub seed: u32,
}

impl Default for ImageGenerationConfig {
    fn default() -> Self {
        Self {
            number_of_images: 1,
            height: 1024,
            width: 1024,
            cfg_scale: 8.0,
            seed: 0,
        }
    }
}

/// `TEXT_IMAGE` task body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextToImageRequest {
    pub task_type: String,
    pub text_to_image_params: TextToImageParams,
    pub image_generation_config: ImageGenerationConfig,
}

impl TextToImageRequest {
    pub fn new(prompt: impl Into<String>, config: ImageGenerationConfig) -> Self {
        Self {
            task_type: TEXT_IMAGE.to_string(),
            text_to_image_params: TextToImageParams {
                text: prompt.into(),
                negative_text: None,
            },
            image_generation_config: config,
        }
    }

    pub fn with_negative_text(mut self, negative: impl Into<String>) -> Self {
        self.text_to_image_params.negative_text = Some(negative.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Generate images and return them base64-encoded
pub async fn generate_images(
    runtime: &dyn ModelRuntime,
    model_id: &str,
    request: &TextToImageRequest,
) -> Result<Vec<String>, ImageError> {
    let body = serde_json::to_value(request)
        .map_err(|e| ImageError::Generation(format!("Failed to encode request: {e}")))?;
    let raw = runtime.invoke_model(model_id, &body).await?;
    let response: ImageResponse = serde_json::from_value(raw)
        .map_err(|e| BedrockError::Decode(format!("Unexpected image response: {e}")))?;

    if let Some(error) = response.error.filter(|e| !e.is_empty()) {
        return Err(ImageError::Generation(error));
    }
    if response.images.is_empty() {
        return Err(ImageError::Generation("No images returned".to_string()));
    }

    info!("{} returned {} image(s)", model_id, response.images.len());
    Ok(response.images)
}

/// Decode a base64 image and write it to `path`
pub fn save_image(base64_image: &str, path: &Path) -> Result<(), ImageError> {
    let bytes = STANDARD.decode(base64_image.trim())?;
    let io_error = |source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, bytes).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bedrock::{ConverseRequest, ConverseResponse};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tempfile::tempdir;

    struct CannedRuntime(Value);

    #[async_trait]
    impl ModelRuntime for CannedRuntime {
        async fn converse(&self, _: &str, _: &ConverseRequest) -> Result<ConverseResponse, BedrockError> {
            Err(BedrockError::BadRequest("not supported".to_string()))
        }

        async fn invoke_model(&self, _: &str, body: &Value) -> Result<Value, BedrockError> {
            assert_eq!(body["taskType"], "TEXT_IMAGE");
            Ok(self.0.clone())
        }

        fn provider_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_request_layout() {
        let request = TextToImageRequest::new("a red fox", ImageGenerationConfig::default())
            .with_negative_text("blurry");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["taskType"], "TEXT_IMAGE");
        assert_eq!(value["textToImageParams"]["negativeText"], "blurry");
        assert_eq!(value["imageGenerationConfig"]["numberOfImages"], 1);
        assert_eq!(value["imageGenerationConfig"]["cfgScale"], 8.0);
    }

    #[tokio::test]
    async fn test_generate_and_save() {
        let encoded = STANDARD.encode(b"\x89PNG fake");
        let runtime = CannedRuntime(json!({"images": [encoded]}));
        let request = TextToImageRequest::new("a red fox", ImageGenerationConfig::default());

        let images = generate_images(&runtime, "amazon.nova-canvas-v1:0", &request).await.unwrap();
        assert_eq!(images.len(), 1);

        let dir = tempdir().unwrap();
        let path = dir.path().join("out/fox.png");
        save_image(&images[0], &path).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"\x89PNG fake");
    }

    #[tokio::test]
    async fn test_generation_error() {
        let runtime = CannedRuntime(json!({"images": [], "error": "content filtered"}));
        let request = TextToImageRequest::new("x", ImageGenerationConfig::default());

        let err = generate_images(&runtime, "m", &request).await.unwrap_err();
        assert_eq!(err.to_string(), "Image generation failed: content filtered");
    }

    #[test]
    fn test_save_rejects_bad_base64() {
        let dir = tempdir().unwrap();
        let result = save_image("not base64!!", &dir.path().join("x.png"));
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }
}
