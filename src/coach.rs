//! Orchestrator wiring the session state machine to the pipeline.
//!
//! One pipeline call is in flight at a time: each method drives a single user
//! action to completion and routes the result (or failure) back into the
//! session under the epoch it was issued with.

use tracing::instrument;

use crate::backend::GenerativeBackend;
use crate::error::SessionError;
use crate::export;
use crate::pipeline::{Pipeline, UploadedFile};
use crate::session::{DocumentType, Session};

/// Default model identifier for the generative backend.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// A study session bound to one backend. Remote failures land in the session
/// as user-visible state, so the driving methods only return `Err` for local
/// validation problems.
#[derive(Debug)]
pub struct StudyCoach<C> {
    session: Session,
    pipeline: Pipeline<C>,
}

impl<C: GenerativeBackend> StudyCoach<C> {
    pub fn new(backend: C) -> Self {
        Self::with_model(backend, DEFAULT_MODEL)
    }

    pub fn with_model(backend: C, model: impl Into<String>) -> Self {
        Self { session: Session::new(), pipeline: Pipeline::new(backend, model) }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_grade_level(&mut self, grade: impl Into<String>) -> Result<(), SessionError> {
        self.session.set_grade_level(grade)
    }

    pub fn select_question(&mut self, index: usize) -> Result<(), SessionError> {
        self.session.select_question(index)
    }

    pub fn answer_another(&mut self) -> Result<(), SessionError> {
        self.session.answer_another()
    }

    pub fn restart(&mut self) {
        self.session.restart();
    }

    /// Serialize the session history as a Markdown document.
    pub fn export_history(&self) -> String {
        export::history_markdown(self.session.history())
    }

    /// Run the upload path: extract → classify → generate/extract questions.
    /// Remote failures are routed into the session; only the grade-level
    /// guard surfaces as `Err`.
    #[instrument(skip(self, file), fields(file = %file.name))]
    pub async fn upload(&mut self, file: &UploadedFile) -> Result<(), SessionError> {
        let epoch = self.session.begin_upload()?;

        let text = match self.pipeline.extract_text(file).await {
            Ok(text) => text,
            Err(err) => {
                self.session.pipeline_failed(epoch, err);
                return Ok(());
            }
        };
        self.session.text_extracted(epoch, text.clone());

        let classification = self.pipeline.classify(&text).await;
        self.session.document_classified(epoch, classification);

        let grade = self.session.grade_level().unwrap_or_default().to_string();
        let pool = match classification.document_type {
            DocumentType::StudyMaterial => self.pipeline.generate_questions(&text, &grade).await,
            DocumentType::QuestionPaper => self.pipeline.extract_questions(&text).await,
        };
        match pool {
            Ok(pool) => self.session.questions_ready(epoch, pool),
            Err(err) => self.session.pipeline_failed(epoch, err),
        }
        Ok(())
    }

    /// Run the evaluation path for the selected question. Branches on the
    /// document type: source-based for study material, grounded for question
    /// papers.
    #[instrument(skip(self, answer), fields(answer_len = answer.len()))]
    pub async fn submit_answer(&mut self, answer: &str) -> Result<(), SessionError> {
        let ticket = self.session.begin_evaluation(answer)?;

        let result = match (&ticket.source_text, ticket.document_type) {
            (Some(source), DocumentType::StudyMaterial) => {
                self.pipeline
                    .evaluate_source_based(&ticket.question, &ticket.answer, source)
                    .await
            }
            _ => {
                self.pipeline
                    .evaluate_grounded(&ticket.question, &ticket.answer)
                    .await
            }
        };

        match result {
            Ok(feedback) => self.session.evaluation_complete(ticket.epoch, feedback),
            Err(err) => self.session.pipeline_failed(ticket.epoch, err),
        }
        Ok(())
    }
}
