use thiserror::Error;

/// Failures raised by a [`GenerativeBackend`](crate::backend::GenerativeBackend)
/// implementation. Credential problems get their own variant so callers never
/// have to pattern-match message text.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Authentication failed: invalid or missing API credential")]
    Authentication,
    #[error("Mock error: {0}")]
    Mock(String),
}

impl BackendError {
    /// True for invalid/missing-credential failures, which the session treats
    /// as a persistent configuration problem rather than a transient error.
    pub fn is_authentication(&self) -> bool {
        matches!(self, BackendError::Authentication)
    }
}

/// Domain-tagged failures of the four pipeline stages. Each maps to exactly
/// one recovery path in the session state machine.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No text could be extracted from the document. It might be an image-only file or a document with no selectable text.")]
    ExtractionEmpty,
    #[error("Unsupported file type: {media_type}. Please upload a text, image, or PDF file.")]
    UnsupportedType { media_type: String },
    #[error("Failed to extract text from {file_name}. The AI model may be busy or the file format is too complex.")]
    ExtractionFailed {
        file_name: String,
        #[source]
        source: BackendError,
    },
    #[error("The AI failed to produce any questions from the document.")]
    NoQuestionsProduced,
    #[error("Failed to generate exam questions. The AI model may be temporarily unavailable.")]
    GenerationFailed(#[source] BackendError),
    #[error("Failed to evaluate the answer. Please try submitting again.")]
    EvaluationFailed(#[source] BackendError),
    #[error("API credential is invalid or missing. Set GEMINI_API_KEY and reload.")]
    CredentialInvalid,
}

impl PipelineError {
    pub fn is_credential(&self) -> bool {
        matches!(self, PipelineError::CredentialInvalid)
    }
}

/// Local errors surfaced by the session state machine before any pipeline
/// call is issued.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("Action not allowed in the current phase ({0})")]
    InvalidPhase(&'static str),
}
