//! Document/evaluation pipeline: four stateless request/response operations
//! against a [`GenerativeBackend`], each declaring the exact response shape
//! the backend must return.
//!
//! No caching, no batching, no automatic retry; every failure maps to one
//! domain-tagged [`PipelineError`] and recovery is a new user action.

use std::collections::HashSet;
use std::path::Path;

use base64::Engine;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::{GenerateRequest, GenerativeBackend, RequestPart};
use crate::error::{BackendError, PipelineError};
use crate::prompts;
use crate::session::{Classification, DocumentType, Feedback};

/// Character budget for the classification excerpt.
pub const CLASSIFY_CONTEXT_CHARS: usize = 4_000;
/// Character budget for generation and evaluation excerpts.
pub const DOCUMENT_CONTEXT_CHARS: usize = 8_000;

/// A file handed in by the user, with its declared media type.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), media_type: media_type.into(), bytes }
    }

    /// Read a file from disk, inferring the media type from its extension.
    /// Unknown extensions get `application/octet-stream` and are rejected by
    /// the extraction stage.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = match path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("txt") => "text/plain",
            Some("md") => "text/markdown",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("pdf") => "application/pdf",
            _ => "application/octet-stream",
        };
        Ok(Self::new(name, media_type, bytes))
    }

    fn is_plain_text(&self) -> bool {
        self.media_type.starts_with("text/") || self.name.ends_with(".md")
    }

    fn needs_remote_extraction(&self) -> bool {
        self.media_type.starts_with("image/") || self.media_type == "application/pdf"
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Classification of an uploaded study document")]
struct ClassificationPayload {
    /// Either STUDY_MATERIAL or QUESTION_PAPER.
    #[schemars(description = "STUDY_MATERIAL if the document has its own answers and information, QUESTION_PAPER if it contains only questions")]
    category: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Exam questions derived from a document")]
struct QuestionListPayload {
    /// The derived exam questions, in order.
    #[schemars(description = "An array of distinct, short, NYSC-style exam questions based on the document")]
    questions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[schemars(description = "Structured evaluation of a user's answer")]
struct FeedbackPayload {
    /// Confidence score (0-100) of the user's answer.
    #[schemars(range(min = 0.0, max = 100.0), description = "Confidence score (0-100) of the user's answer")]
    confidence: f64,
    #[schemars(description = "A brief textual summary of the confidence score")]
    assessment: String,
    #[schemars(description = "Comparison of the user's answer with the key points")]
    comparison: String,
    #[schemars(description = "First short and brief suggested exemplary answer")]
    suggestion1: String,
    #[schemars(description = "Second short and brief suggested exemplary answer")]
    suggestion2: String,
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Trim an optional Markdown code fence from a structured response before
/// parsing. Backends occasionally wrap their JSON despite the contract.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    for prefix in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.strip_suffix("```").unwrap_or(rest).trim();
        }
    }
    trimmed
}

fn response_schema<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}))
}

fn parse_payload<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, BackendError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned)
        .map_err(|e| BackendError::Api(format!("response violates declared schema: {e}")))
}

/// Re-classify credential failures; everything else goes through `wrap`.
fn stage_error(err: BackendError, wrap: impl FnOnce(BackendError) -> PipelineError) -> PipelineError {
    if err.is_authentication() {
        PipelineError::CredentialInvalid
    } else {
        wrap(err)
    }
}

/// The four remote operations, bound to one backend and model.
#[derive(Debug, Clone)]
pub struct Pipeline<C> {
    backend: C,
    model: String,
}

impl<C: GenerativeBackend> Pipeline<C> {
    pub fn new(backend: C, model: impl Into<String>) -> Self {
        Self { backend, model: model.into() }
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    /// Extract the plain text of an uploaded file. Text and markdown files
    /// are decoded locally with no remote call; images and PDFs go to the
    /// backend with a body-text-only instruction.
    #[instrument(skip(self, file), fields(file = %file.name, media_type = %file.media_type))]
    pub async fn extract_text(&self, file: &UploadedFile) -> Result<String, PipelineError> {
        if file.is_plain_text() {
            debug!("Decoding text file locally");
            let text = String::from_utf8_lossy(&file.bytes).into_owned();
            if text.trim().is_empty() {
                return Err(PipelineError::ExtractionEmpty);
            }
            return Ok(text);
        }

        if !file.needs_remote_extraction() {
            warn!(media_type = %file.media_type, "Rejecting unsupported media type");
            return Err(PipelineError::UnsupportedType { media_type: file.media_type.clone() });
        }

        let data_base64 = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
        let request = GenerateRequest {
            model: self.model.clone(),
            parts: vec![
                RequestPart::Text(prompts::EXTRACT_TEXT.to_string()),
                RequestPart::InlineData { media_type: file.media_type.clone(), data_base64 },
            ],
            response_schema: None,
            use_search: false,
        };

        let response = self.backend.generate(request).await.map_err(|e| {
            stage_error(e, |source| PipelineError::ExtractionFailed {
                file_name: file.name.clone(),
                source,
            })
        })?;

        let extracted = response.text.trim().to_string();
        if extracted.is_empty() {
            return Err(PipelineError::ExtractionEmpty);
        }
        info!(extracted_len = extracted.len(), "Extracted document text");
        Ok(extracted)
    }

    /// Classify the document as study material or question paper. Best
    /// effort: any failure yields the study-material fallback, marked
    /// `defaulted` so callers can tell the paths apart.
    #[instrument(skip(self, document_text), fields(text_len = document_text.len()))]
    pub async fn classify(&self, document_text: &str) -> Classification {
        let excerpt = clip_chars(document_text, CLASSIFY_CONTEXT_CHARS);
        let request = GenerateRequest::text(&self.model, prompts::classify_document(excerpt))
            .with_schema(response_schema::<ClassificationPayload>());

        let outcome = match self.backend.generate(request).await {
            Ok(response) => parse_payload::<ClassificationPayload>(&response.text),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(payload) if payload.category == prompts::LABEL_QUESTION_PAPER => {
                Classification::classified(DocumentType::QuestionPaper)
            }
            Ok(payload) if payload.category == prompts::LABEL_STUDY_MATERIAL => {
                Classification::classified(DocumentType::StudyMaterial)
            }
            Ok(payload) => {
                warn!(label = %payload.category, "Unrecognized classification label; defaulting");
                Classification::defaulted()
            }
            Err(e) => {
                warn!(error = %e, "Classification call failed; defaulting to study material");
                Classification::defaulted()
            }
        }
    }

    /// Generate seven grade-appropriate exam questions from study material.
    #[instrument(skip(self, document_text), fields(text_len = document_text.len(), grade = grade_level))]
    pub async fn generate_questions(
        &self,
        document_text: &str,
        grade_level: &str,
    ) -> Result<Vec<String>, PipelineError> {
        let excerpt = clip_chars(document_text, DOCUMENT_CONTEXT_CHARS);
        let prompt = prompts::generate_questions(excerpt, grade_level);
        self.question_call(prompt).await
    }

    /// Pull up to seven questions out of an existing question paper.
    #[instrument(skip(self, document_text), fields(text_len = document_text.len()))]
    pub async fn extract_questions(&self, document_text: &str) -> Result<Vec<String>, PipelineError> {
        let excerpt = clip_chars(document_text, DOCUMENT_CONTEXT_CHARS);
        let prompt = prompts::extract_questions(excerpt);
        self.question_call(prompt).await
    }

    async fn question_call(&self, prompt: String) -> Result<Vec<String>, PipelineError> {
        let request = GenerateRequest::text(&self.model, prompt)
            .with_schema(response_schema::<QuestionListPayload>());

        let response = self
            .backend
            .generate(request)
            .await
            .map_err(|e| stage_error(e, PipelineError::GenerationFailed))?;

        let payload: QuestionListPayload =
            parse_payload(&response.text).map_err(PipelineError::GenerationFailed)?;
        if payload.questions.is_empty() {
            return Err(PipelineError::NoQuestionsProduced);
        }
        info!(pool_size = payload.questions.len(), "Received question pool");
        Ok(payload.questions)
    }

    /// Score an answer against the uploaded source text (study-material path).
    #[instrument(skip_all, fields(question_len = question.len(), answer_len = user_answer.len()))]
    pub async fn evaluate_source_based(
        &self,
        question: &str,
        user_answer: &str,
        source_text: &str,
    ) -> Result<Feedback, PipelineError> {
        let excerpt = clip_chars(source_text, DOCUMENT_CONTEXT_CHARS);
        let prompt = prompts::evaluate_source_based(excerpt, question, user_answer);
        let request = GenerateRequest::text(&self.model, prompt)
            .with_schema(response_schema::<FeedbackPayload>());
        self.evaluation_call(request).await
    }

    /// Score an answer with general knowledge plus live web search
    /// (question-paper path). The returned feedback carries cited sources,
    /// deduplicated by URI in first-seen order.
    #[instrument(skip_all, fields(question_len = question.len(), answer_len = user_answer.len()))]
    pub async fn evaluate_grounded(
        &self,
        question: &str,
        user_answer: &str,
    ) -> Result<Feedback, PipelineError> {
        let prompt = prompts::evaluate_grounded(question, user_answer);
        let request = GenerateRequest::text(&self.model, prompt)
            .with_schema(response_schema::<FeedbackPayload>())
            .with_search();
        self.evaluation_call(request).await
    }

    async fn evaluation_call(&self, request: GenerateRequest) -> Result<Feedback, PipelineError> {
        let response = self
            .backend
            .generate(request)
            .await
            .map_err(|e| stage_error(e, PipelineError::EvaluationFailed))?;

        let payload: FeedbackPayload =
            parse_payload(&response.text).map_err(PipelineError::EvaluationFailed)?;

        let mut seen = HashSet::new();
        let sources = response
            .sources
            .into_iter()
            .filter(|s| seen.insert(s.uri.clone()))
            .collect();

        let feedback = Feedback {
            confidence: payload.confidence.round().clamp(0.0, 100.0) as u8,
            assessment: payload.assessment,
            comparison: payload.comparison,
            suggestion1: payload.suggestion1,
            suggestion2: payload.suggestion2,
            sources,
        };
        info!(confidence = feedback.confidence, sources = feedback.sources.len(),
              "Evaluation complete");
        Ok(feedback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SourceRef;
    use crate::clients::mock::{MockBackend, MockReply};

    const MODEL: &str = "gemini-2.5-flash";

    fn feedback_json() -> String {
        serde_json::json!({
            "confidence": 87.4,
            "assessment": "Good answer.",
            "comparison": "Matches most key points.",
            "suggestion1": "Model answer one.",
            "suggestion2": "Model answer two."
        })
        .to_string()
    }

    #[test]
    fn clip_chars_respects_multibyte_boundaries() {
        assert_eq!(clip_chars("héllo", 2), "hé");
        assert_eq!(clip_chars("short", 100), "short");
        let long = "x".repeat(10_000);
        assert_eq!(clip_chars(&long, DOCUMENT_CONTEXT_CHARS).len(), DOCUMENT_CONTEXT_CHARS);
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn text_files_are_decoded_without_a_remote_call() {
        let (backend, handle) = MockBackend::new();
        let pipeline = Pipeline::new(backend, MODEL);

        let file = UploadedFile::new("notes.txt", "text/plain", b"Hello world".to_vec());
        let text = pipeline.extract_text(&file).await.unwrap();

        assert_eq!(text, "Hello world");
        assert_eq!(handle.request_count(), 0);
    }

    #[tokio::test]
    async fn blank_text_file_is_extraction_empty() {
        let (backend, _handle) = MockBackend::new();
        let pipeline = Pipeline::new(backend, MODEL);

        let file = UploadedFile::new("blank.txt", "text/plain", b"  \n ".to_vec());
        let result = pipeline.extract_text(&file).await;
        assert!(matches!(result, Err(PipelineError::ExtractionEmpty)));
    }

    #[tokio::test]
    async fn unsupported_media_type_is_rejected_locally() {
        let (backend, handle) = MockBackend::new();
        let pipeline = Pipeline::new(backend, MODEL);

        let file = UploadedFile::new("song.mp3", "audio/mpeg", vec![0, 1, 2]);
        let result = pipeline.extract_text(&file).await;

        assert!(matches!(result, Err(PipelineError::UnsupportedType { .. })));
        assert_eq!(handle.request_count(), 0);
    }

    #[tokio::test]
    async fn pdf_extraction_sends_inline_data() {
        let (backend, handle) = MockBackend::new();
        handle.add_text("Extracted body text.");
        let pipeline = Pipeline::new(backend, MODEL);

        let file = UploadedFile::new("doc.pdf", "application/pdf", b"%PDF".to_vec());
        let text = pipeline.extract_text(&file).await.unwrap();

        assert_eq!(text, "Extracted body text.");
        let requests = handle.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .parts
            .iter()
            .any(|p| matches!(p, RequestPart::InlineData { media_type, .. } if media_type == "application/pdf")));
        assert!(requests[0].prompt_text().contains("main body"));
    }

    #[tokio::test]
    async fn blank_remote_extraction_is_extraction_empty() {
        let (backend, handle) = MockBackend::new();
        handle.add_text("   ");
        let pipeline = Pipeline::new(backend, MODEL);

        let file = UploadedFile::new("scan.png", "image/png", vec![1]);
        let result = pipeline.extract_text(&file).await;
        assert!(matches!(result, Err(PipelineError::ExtractionEmpty)));
    }

    #[tokio::test]
    async fn classification_defaults_on_remote_failure() {
        let (backend, _handle) = MockBackend::with_replies(vec![MockReply::Error(
            BackendError::Api("boom".to_string()),
        )]);
        let pipeline = Pipeline::new(backend, MODEL);

        let classification = pipeline.classify("some text").await;
        assert_eq!(classification, Classification::defaulted());
        assert!(classification.defaulted);
    }

    #[tokio::test]
    async fn classification_parses_question_paper_label() {
        let (backend, handle) = MockBackend::new();
        handle.add_text(r#"{"category": "QUESTION_PAPER"}"#);
        let pipeline = Pipeline::new(backend, MODEL);

        let classification = pipeline.classify("1. Mention five (5) things.").await;
        assert_eq!(classification.document_type, DocumentType::QuestionPaper);
        assert!(!classification.defaulted);

        // The classification excerpt is capped at 4000 chars.
        let long = "a".repeat(10_000);
        let (backend, handle) = MockBackend::new();
        handle.add_text(r#"{"category": "STUDY_MATERIAL"}"#);
        let pipeline = Pipeline::new(backend, MODEL);
        pipeline.classify(&long).await;
        let prompt = handle.requests()[0].prompt_text();
        assert!(prompt.len() < 4_000 + 600);
    }

    #[tokio::test]
    async fn empty_question_pool_is_no_questions_produced() {
        let (backend, handle) = MockBackend::new();
        handle.add_text(r#"{"questions": []}"#);
        let pipeline = Pipeline::new(backend, MODEL);

        let result = pipeline.generate_questions("doc", "Inspector").await;
        assert!(matches!(result, Err(PipelineError::NoQuestionsProduced)));
    }

    #[tokio::test]
    async fn generation_parses_fenced_payload() {
        let (backend, handle) = MockBackend::new();
        handle.add_text("```json\n{\"questions\": [\"Q1\", \"Q2\"]}\n```");
        let pipeline = Pipeline::new(backend, MODEL);

        let pool = pipeline.generate_questions("doc", "Inspector").await.unwrap();
        assert_eq!(pool, vec!["Q1".to_string(), "Q2".to_string()]);
        assert!(handle.requests()[0].response_schema.is_some());
    }

    #[tokio::test]
    async fn malformed_generation_payload_is_generation_failed() {
        let (backend, handle) = MockBackend::new();
        handle.add_text("not json at all");
        let pipeline = Pipeline::new(backend, MODEL);

        let result = pipeline.generate_questions("doc", "Inspector").await;
        assert!(matches!(result, Err(PipelineError::GenerationFailed(_))));
    }

    #[tokio::test]
    async fn authentication_failure_becomes_credential_invalid() {
        let (backend, _handle) =
            MockBackend::with_replies(vec![MockReply::Error(BackendError::Authentication)]);
        let pipeline = Pipeline::new(backend, MODEL);

        let result = pipeline.generate_questions("doc", "Inspector").await;
        assert!(matches!(result, Err(PipelineError::CredentialInvalid)));
    }

    #[tokio::test]
    async fn source_based_evaluation_clamps_confidence() {
        let (backend, handle) = MockBackend::new();
        handle.add_text(feedback_json());
        let pipeline = Pipeline::new(backend, MODEL);

        let feedback = pipeline
            .evaluate_source_based("Q", "A", "source text")
            .await
            .unwrap();

        assert_eq!(feedback.confidence, 87);
        assert!(feedback.sources.is_empty());
        assert!(!handle.requests()[0].use_search);
        assert!(handle.requests()[0].prompt_text().contains("source text"));
    }

    #[tokio::test]
    async fn grounded_evaluation_dedupes_sources_by_uri() {
        let sources = vec![
            SourceRef { title: "NYSC Handbook".to_string(), uri: "https://a.example".to_string() },
            SourceRef { title: "Duplicate".to_string(), uri: "https://a.example".to_string() },
            SourceRef { title: "Gazette".to_string(), uri: "https://b.example".to_string() },
        ];
        let (backend, handle) = MockBackend::with_replies(vec![MockReply::Grounded {
            text: feedback_json(),
            sources,
        }]);
        let pipeline = Pipeline::new(backend, MODEL);

        let feedback = pipeline.evaluate_grounded("Q", "A").await.unwrap();

        assert!(handle.requests()[0].use_search);
        assert_eq!(feedback.sources.len(), 2);
        assert_eq!(feedback.sources[0].uri, "https://a.example");
        assert_eq!(feedback.sources[0].title, "NYSC Handbook");
        assert_eq!(feedback.sources[1].uri, "https://b.example");
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_clamped() {
        let (backend, handle) = MockBackend::new();
        handle.add_text(
            serde_json::json!({
                "confidence": 250.0,
                "assessment": "a",
                "comparison": "c",
                "suggestion1": "s1",
                "suggestion2": "s2"
            })
            .to_string(),
        );
        let pipeline = Pipeline::new(backend, MODEL);

        let feedback = pipeline.evaluate_grounded("Q", "A").await.unwrap();
        assert_eq!(feedback.confidence, 100);
    }
}
