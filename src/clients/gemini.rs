use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{GenerateRequest, GenerateResponse, GenerativeBackend, RequestPart, SourceRef};
use crate::config::{BackendConfig, KeyFromEnv};
use crate::error::BackendError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
enum GeminiPart {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData", rename_all = "camelCase")]
    InlineData { mime_type: String, data: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_search: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    title: String,
    #[serde(default)]
    uri: String,
}

/// Client for the Gemini generateContent API.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    config: BackendConfig,
    client: Client,
}

impl KeyFromEnv for GeminiBackend {
    const KEY_NAME: &'static str = "GEMINI_API_KEY";
}

impl GeminiBackend {
    pub fn new(config: BackendConfig) -> Self {
        info!(model = %config.model, "Creating new Gemini backend");
        Self { config, client: Client::new() }
    }

    /// Build a backend from the environment. The key may be absent; the first
    /// call will then fail with an authentication error.
    pub fn from_env() -> Self {
        let api_key = Self::find_key().unwrap_or_default();
        Self::new(BackendConfig::new(api_key))
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, request: &GenerateRequest) -> GeminiRequest {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                RequestPart::Text(text) => GeminiPart::Text(text.clone()),
                RequestPart::InlineData { media_type, data_base64 } => GeminiPart::InlineData {
                    mime_type: media_type.clone(),
                    data: data_base64.clone(),
                },
            })
            .collect();

        let generation_config = request.response_schema.as_ref().map(|schema| GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: schema.clone(),
        });

        let tools = request
            .use_search
            .then(|| vec![GeminiTool { google_search: serde_json::json!({}) }]);

        GeminiRequest { contents: vec![GeminiContent { parts }], generation_config, tools }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    #[instrument(skip(self, request), fields(model = %request.model, parts = request.parts.len()))]
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, BackendError> {
        if self.config.api_key.is_empty() {
            warn!("No API key configured for Gemini backend");
            return Err(BackendError::Authentication);
        }

        let body = self.build_request(&request);
        let url = format!("{}/{}:generateContent", API_BASE, request.model);
        debug!(url = %url, schema = request.response_schema.is_some(), search = request.use_search,
               "Sending request to Gemini API");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request failed");
                BackendError::Http(e.to_string())
            })?;

        debug!(status = %response.status(), "Received response from Gemini API");

        if response.status() == 429 {
            warn!("Gemini API rate limit exceeded");
            return Err(BackendError::RateLimit);
        }

        if response.status() == 401 || response.status() == 403 {
            error!(status = %response.status(), "Gemini API authentication failed");
            return Err(BackendError::Authentication);
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API error");
            return Err(BackendError::Api(error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini response JSON");
            BackendError::Http(e.to_string())
        })?;

        let candidate = gemini_response.candidates.into_iter().next().ok_or_else(|| {
            error!("No candidates in Gemini response");
            BackendError::Api("No candidates in response".to_string())
        })?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let sources = candidate
            .grounding_metadata
            .map(|metadata| {
                metadata
                    .grounding_chunks
                    .into_iter()
                    .filter_map(|chunk| chunk.web)
                    .filter(|web| !web.uri.is_empty())
                    .map(|web| SourceRef { title: web.title, uri: web.uri })
                    .collect()
            })
            .unwrap_or_default();

        info!(response_len = text.len(), "Successfully received Gemini response");
        Ok(GenerateResponse { text, sources })
    }

    fn clone_box(&self) -> Box<dyn GenerativeBackend> {
        Box::new(self.clone())
    }
}
