//! Low-level generative backend abstraction.
//!
//! Implementors execute a single request/response exchange with a
//! generative-AI service. Prompt construction, response-schema declaration,
//! and parsing of the returned text live one layer up in
//! [`Pipeline`](crate::pipeline::Pipeline).

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// One part of a multi-modal request: plain instruction text or an inline
/// binary payload (base64) with its media type.
#[derive(Debug, Clone)]
pub enum RequestPart {
    Text(String),
    InlineData { media_type: String, data_base64: String },
}

/// A single generateContent-style exchange.
///
/// When `response_schema` is set the backend is contractually bound to return
/// JSON conforming to it. When `use_search` is set the backend may consult
/// live web search and report citations in [`GenerateResponse::sources`].
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub parts: Vec<RequestPart>,
    pub response_schema: Option<serde_json::Value>,
    pub use_search: bool,
}

impl GenerateRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: vec![RequestPart::Text(prompt.into())],
            response_schema: None,
            use_search: false,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_search(mut self) -> Self {
        self.use_search = true;
        self
    }

    /// Concatenated text parts, mainly useful for assertions against mocks.
    pub fn prompt_text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let RequestPart::Text(t) = part {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(t);
            }
        }
        out
    }
}

/// A web citation attached to a grounded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub uri: String,
}

/// Raw backend output: the model text plus any grounding citations.
#[derive(Debug, Clone, Default)]
pub struct GenerateResponse {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

impl GenerateResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { text: text.into(), sources: Vec::new() }
    }
}

/// Low-level backend client abstraction.
///
/// Implementors provide `generate`, which executes one request and returns
/// the raw model output. Higher-level schema handling and parsing is done by
/// the pipeline.
#[async_trait]
pub trait GenerativeBackend: Send + Sync + Debug {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, BackendError>;

    /// Clone this backend into a boxed trait object.
    fn clone_box(&self) -> Box<dyn GenerativeBackend>;
}

impl Clone for Box<dyn GenerativeBackend> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[async_trait]
impl GenerativeBackend for Box<dyn GenerativeBackend> {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, BackendError> {
        self.as_ref().generate(request).await
    }

    fn clone_box(&self) -> Box<dyn GenerativeBackend> {
        self.as_ref().clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_text_joins_text_parts_only() {
        let mut req = GenerateRequest::text("m", "first");
        req.parts.push(RequestPart::InlineData {
            media_type: "image/png".to_string(),
            data_base64: "AAAA".to_string(),
        });
        req.parts.push(RequestPart::Text("second".to_string()));
        assert_eq!(req.prompt_text(), "first\nsecond");
    }
}
