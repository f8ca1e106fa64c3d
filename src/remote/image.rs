/// Image generation collaborator (provider A): one prompt in, raw image
/// bytes out, decoded from the base64 payload at the adapter.
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::debug;

use super::{RemoteError, Result, check_json, network};

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    /// Target dimensions, e.g. `1536x1024`.
    pub size: String,
    pub quality: Option<String>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>>;
}

pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpImageGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size,
        });
        if let Some(ref quality) = request.quality {
            payload["quality"] = json!(quality);
        }
        debug!(model = %self.model, size = %request.size, "requesting image");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(network)?;
        let data = check_json(response).await?;
        first_image_bytes(&data)
    }
}

/// Decode `data[0].b64_json` of an image-generation response.
fn first_image_bytes(data: &Value) -> Result<Vec<u8>> {
    let encoded = data
        .get("data")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("b64_json"))
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::MalformedResponse("b64_json missing".to_string()))?;
    STANDARD
        .decode(encoded)
        .map_err(|err| RemoteError::MalformedResponse(err.to_string()))
}
