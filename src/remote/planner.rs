/// Slide-plan collaborator: instructions plus the unit's two reference
/// documents go out, the model's text and usage counters come back.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::debug;

use crate::cost::UsageCounters;

use super::{RemoteError, Result, check_json, network};

/// One planning request for one unit.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub instructions: String,
    /// The tagged content document of the unit.
    pub content_document: PathBuf,
    /// The narration script of the unit.
    pub narration_document: PathBuf,
    /// User-level directive appended after the attachments.
    pub directive: String,
    /// Response schema the collaborator should honor, when supported.
    pub schema: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct PlanResponse {
    pub text: String,
    pub usage: UsageCounters,
}

impl PlanResponse {
    /// Parse the response text as JSON, tolerating prose around the
    /// object.
    pub fn json_lenient(&self) -> Result<Value> {
        extract_json(&self.text)
    }

    /// Parse the response text as JSON, rejecting any text outside the
    /// object.
    pub fn json_strict(&self) -> Result<Value> {
        parse_json_strict(&self.text)
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse>;
}

/// HTTP adapter posting the request to a responses-style endpoint with
/// the documents attached as base64 payloads.
pub struct HttpPlanner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpPlanner {
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
impl Planner for HttpPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse> {
        let attachments = vec![
            attachment(&request.content_document)?,
            attachment(&request.narration_document)?,
        ];
        let mut payload = json!({
            "model": self.model,
            "instructions": request.instructions,
            "input": request.directive,
            "attachments": attachments,
        });
        if let Some(ref schema) = request.schema {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": schema,
            });
        }
        debug!(model = %self.model, endpoint = %self.endpoint, "requesting slide plan");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(network)?;
        let data = check_json(response).await?;

        let text = data
            .get("output_text")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::MalformedResponse("output_text missing".to_string()))?
            .trim()
            .to_string();
        let usage = UsageCounters::from_response(data.get("usage"));
        Ok(PlanResponse { text, usage })
    }
}

fn attachment(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(json!({
        "filename": filename,
        "data": STANDARD.encode(bytes),
    }))
}

/// Parse JSON out of model text, even with prose around the object:
/// a full parse first, then the substring from the first `{` to the
/// last `}`.
pub fn extract_json(text: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&text[start..=end])
            .map_err(|err| RemoteError::MalformedResponse(err.to_string())),
        _ => Err(RemoteError::MalformedResponse(
            "no JSON object in response".to_string(),
        )),
    }
}

/// Parse JSON out of model text, rejecting any non-whitespace outside
/// the outermost braces.
pub fn parse_json_strict(text: &str) -> Result<Value> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(RemoteError::MalformedResponse(
            "no JSON object in response".to_string(),
        ));
    };
    if end < start {
        return Err(RemoteError::MalformedResponse(
            "no JSON object in response".to_string(),
        ));
    }
    if !text[..start].trim().is_empty() || !text[end + 1..].trim().is_empty() {
        return Err(RemoteError::MalformedResponse(
            "text outside the JSON object".to_string(),
        ));
    }
    serde_json::from_str(&text[start..=end])
        .map_err(|err| RemoteError::MalformedResponse(err.to_string()))
}
