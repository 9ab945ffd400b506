//! Session data model and state machine.
//!
//! A [`Session`] is the single source of truth for one user's progress
//! through upload → questions → answer → feedback. All mutation happens
//! through the transition methods here; asynchronous completions carry the
//! [`Epoch`] captured when the call was issued and are discarded if a restart
//! happened in between.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::SourceRef;
use crate::error::{PipelineError, SessionError};

/// At most this many questions from the generated pool are shown to the user.
pub const MAX_DISPLAYED_QUESTIONS: usize = 3;

/// Phases of the session, linear with one cycle (feedback → selection) and a
/// hard reset back to `AwaitingUpload` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingUpload,
    ProcessingFile,
    ClassifyingDocument,
    GeneratingQuestions,
    AwaitingQuestionSelection,
    AwaitingAnswer,
    Evaluating,
    ShowingFeedback,
}

impl SessionPhase {
    /// Phases with a pipeline call outstanding; the UI disables its triggers
    /// while one of these is active.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            SessionPhase::ProcessingFile
                | SessionPhase::ClassifyingDocument
                | SessionPhase::GeneratingQuestions
                | SessionPhase::Evaluating
        )
    }
}

/// Classification label for the uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    /// The document teaches; it contains its own answers and information.
    StudyMaterial,
    /// The document contains only questions.
    QuestionPaper,
}

/// Outcome of the classification stage. `defaulted` records whether the label
/// came from the model or from the silent study-material fallback, so callers
/// and tests can tell the two paths apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub document_type: DocumentType,
    pub defaulted: bool,
}

impl Classification {
    pub fn classified(document_type: DocumentType) -> Self {
        Self { document_type, defaulted: false }
    }

    /// The best-effort fallback used when the remote call fails or returns an
    /// unrecognized label.
    pub fn defaulted() -> Self {
        Self { document_type: DocumentType::StudyMaterial, defaulted: true }
    }
}

/// Structured evaluation of one answer. `confidence` is always in 0..=100.
/// `sources` is non-empty only for grounded evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub confidence: u8,
    pub assessment: String,
    pub comparison: String,
    pub suggestion1: String,
    pub suggestion2: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

/// A displayed question; gains its feedback when the user answers it.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub text: String,
    pub feedback: Option<Feedback>,
}

/// One completed evaluation. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    pub feedback: Feedback,
}

/// Token identifying the session generation a pipeline call was issued under.
/// A completion whose epoch no longer matches is stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

/// Everything a grounded or source-based evaluation call needs, captured
/// atomically when evaluation begins. `source_text` is present exactly when
/// `document_type` is `StudyMaterial`.
#[derive(Debug, Clone)]
pub struct EvaluationTicket {
    pub epoch: Epoch,
    pub question: String,
    pub answer: String,
    pub document_type: DocumentType,
    pub source_text: Option<String>,
}

/// In-memory record of one user's session. Lifetime is one process; nothing
/// is persisted.
#[derive(Debug)]
pub struct Session {
    phase: SessionPhase,
    epoch: u64,
    grade_level: Option<String>,
    document_text: Option<String>,
    document_type: Option<DocumentType>,
    classification_defaulted: bool,
    questions: Vec<Question>,
    selected_question: Option<usize>,
    user_answer: Option<String>,
    feedback: Option<Feedback>,
    history: Vec<HistoryEntry>,
    error: Option<String>,
    credential_blocked: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: SessionPhase::AwaitingUpload,
            epoch: 0,
            grade_level: None,
            document_text: None,
            document_type: None,
            classification_defaulted: false,
            questions: Vec::new(),
            selected_question: None,
            user_answer: None,
            feedback: None,
            history: Vec::new(),
            error: None,
            credential_blocked: false,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Read accessors ─────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.epoch)
    }

    pub fn grade_level(&self) -> Option<&str> {
        self.grade_level.as_deref()
    }

    pub fn document_text(&self) -> Option<&str> {
        self.document_text.as_deref()
    }

    pub fn document_type(&self) -> Option<DocumentType> {
        self.document_type
    }

    pub fn classification_defaulted(&self) -> bool {
        self.classification_defaulted
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn selected_question(&self) -> Option<usize> {
        self.selected_question
    }

    pub fn selected_question_text(&self) -> Option<&str> {
        self.selected_question
            .and_then(|i| self.questions.get(i))
            .map(|q| q.text.as_str())
    }

    pub fn user_answer(&self) -> Option<&str> {
        self.user_answer.as_deref()
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True once a credential failure was seen; every further pipeline action
    /// is refused until the credential is fixed and the app reloaded.
    pub fn credential_blocked(&self) -> bool {
        self.credential_blocked
    }

    fn is_current(&self, epoch: Epoch) -> bool {
        if epoch.0 == self.epoch {
            true
        } else {
            debug!(issued = epoch.0, current = self.epoch, "Discarding stale pipeline completion");
            false
        }
    }

    // ── Transitions ────────────────────────────────────────────────────────

    /// Select the grade level. Immutable once document processing starts.
    pub fn set_grade_level(&mut self, grade: impl Into<String>) -> Result<(), SessionError> {
        if self.phase != SessionPhase::AwaitingUpload {
            return Err(SessionError::InvalidPhase("grade level is fixed after upload"));
        }
        self.grade_level = Some(grade.into());
        Ok(())
    }

    /// `AwaitingUpload → ProcessingFile`, guarded by a selected grade level.
    /// A guard violation records an inline error and leaves the phase alone.
    pub fn begin_upload(&mut self) -> Result<Epoch, SessionError> {
        if self.phase != SessionPhase::AwaitingUpload {
            return Err(SessionError::InvalidPhase("a document is already being processed"));
        }
        self.error = None;
        if self.credential_blocked {
            return Err(SessionError::Validation(
                PipelineError::CredentialInvalid.to_string(),
            ));
        }
        if self.grade_level.as_deref().map_or(true, |g| g.trim().is_empty()) {
            let message = "Please select a grade level before uploading a file.".to_string();
            self.error = Some(message.clone());
            return Err(SessionError::Validation(message));
        }
        self.phase = SessionPhase::ProcessingFile;
        Ok(Epoch(self.epoch))
    }

    /// `ProcessingFile → ClassifyingDocument` on successful text extraction.
    pub fn text_extracted(&mut self, epoch: Epoch, text: String) {
        if !self.is_current(epoch) || self.phase != SessionPhase::ProcessingFile {
            return;
        }
        self.document_text = Some(text);
        self.phase = SessionPhase::ClassifyingDocument;
    }

    /// `ClassifyingDocument → GeneratingQuestions`. Classification never
    /// fails: a fallback outcome arrives here like any other.
    pub fn document_classified(&mut self, epoch: Epoch, classification: Classification) {
        if !self.is_current(epoch) || self.phase != SessionPhase::ClassifyingDocument {
            return;
        }
        if classification.defaulted {
            warn!("Classification fell back to study material");
        }
        self.document_type = Some(classification.document_type);
        self.classification_defaulted = classification.defaulted;
        self.phase = SessionPhase::GeneratingQuestions;
    }

    /// `GeneratingQuestions → AwaitingQuestionSelection`. The pool is
    /// shuffled and truncated to [`MAX_DISPLAYED_QUESTIONS`].
    pub fn questions_ready(&mut self, epoch: Epoch, mut pool: Vec<String>) {
        if !self.is_current(epoch) || self.phase != SessionPhase::GeneratingQuestions {
            return;
        }
        pool.shuffle(&mut rand::thread_rng());
        pool.truncate(MAX_DISPLAYED_QUESTIONS);
        info!(displayed = pool.len(), "Question selection ready");
        self.questions = pool
            .into_iter()
            .map(|text| Question { text, feedback: None })
            .collect();
        self.phase = SessionPhase::AwaitingQuestionSelection;
    }

    /// `AwaitingQuestionSelection → AwaitingAnswer` on picking a displayed
    /// question by index.
    pub fn select_question(&mut self, index: usize) -> Result<(), SessionError> {
        if self.phase != SessionPhase::AwaitingQuestionSelection {
            return Err(SessionError::InvalidPhase("no question selection is pending"));
        }
        if index >= self.questions.len() {
            return Err(SessionError::Validation(format!(
                "Question {} does not exist; pick 1-{}.",
                index + 1,
                self.questions.len()
            )));
        }
        self.error = None;
        self.selected_question = Some(index);
        self.phase = SessionPhase::AwaitingAnswer;
        Ok(())
    }

    /// `AwaitingAnswer → Evaluating` on answer submission. Returns everything
    /// the evaluation call needs, captured under the current epoch.
    pub fn begin_evaluation(&mut self, answer: &str) -> Result<EvaluationTicket, SessionError> {
        if self.phase != SessionPhase::AwaitingAnswer {
            return Err(SessionError::InvalidPhase("no answer is awaited"));
        }
        self.error = None;
        if self.credential_blocked {
            return Err(SessionError::Validation(
                PipelineError::CredentialInvalid.to_string(),
            ));
        }
        if answer.trim().is_empty() {
            let message = "Please enter an answer before submitting.".to_string();
            self.error = Some(message.clone());
            return Err(SessionError::Validation(message));
        }
        let question = self
            .selected_question_text()
            .ok_or(SessionError::InvalidPhase("no question selected"))?
            .to_string();
        let document_type = self
            .document_type
            .ok_or(SessionError::InvalidPhase("document was never classified"))?;
        let source_text = match document_type {
            DocumentType::StudyMaterial => Some(
                self.document_text
                    .clone()
                    .ok_or(SessionError::InvalidPhase("no document text"))?,
            ),
            DocumentType::QuestionPaper => None,
        };
        self.user_answer = Some(answer.to_string());
        self.phase = SessionPhase::Evaluating;
        Ok(EvaluationTicket {
            epoch: Epoch(self.epoch),
            question,
            answer: answer.to_string(),
            document_type,
            source_text,
        })
    }

    /// `Evaluating → ShowingFeedback`: attaches feedback to the answered
    /// question and appends exactly one history entry.
    pub fn evaluation_complete(&mut self, epoch: Epoch, feedback: Feedback) {
        if !self.is_current(epoch) || self.phase != SessionPhase::Evaluating {
            return;
        }
        let (Some(index), Some(answer)) = (self.selected_question, self.user_answer.clone())
        else {
            return;
        };
        if let Some(question) = self.questions.get_mut(index) {
            self.history.push(HistoryEntry {
                question: question.text.clone(),
                answer,
                feedback: feedback.clone(),
            });
            question.feedback = Some(feedback.clone());
        }
        self.feedback = Some(feedback);
        self.phase = SessionPhase::ShowingFeedback;
    }

    /// Route a pipeline failure to the nearest safe prior state. Credential
    /// failures raise the persistent banner instead of the inline error.
    pub fn pipeline_failed(&mut self, epoch: Epoch, error: PipelineError) {
        if !self.is_current(epoch) || !self.phase.is_working() {
            return;
        }
        if error.is_credential() {
            warn!("Credential failure; blocking further pipeline progress");
            self.credential_blocked = true;
        }
        match self.phase {
            SessionPhase::ProcessingFile
            | SessionPhase::ClassifyingDocument
            | SessionPhase::GeneratingQuestions => {
                if !error.is_credential() {
                    self.error = Some(error.to_string());
                }
                self.document_text = None;
                self.document_type = None;
                self.classification_defaulted = false;
                self.questions.clear();
                self.selected_question = None;
                self.feedback = None;
                self.phase = SessionPhase::AwaitingUpload;
            }
            SessionPhase::Evaluating => {
                if !error.is_credential() {
                    self.error = Some(format!("{error} Finish what you were doing."));
                }
                // Keep the selected question and answer for resubmission.
                self.phase = SessionPhase::AwaitingAnswer;
            }
            _ => {}
        }
    }

    /// `ShowingFeedback → AwaitingQuestionSelection`: keep questions (with
    /// any attached feedback) and history, clear the per-answer state.
    pub fn answer_another(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::ShowingFeedback {
            return Err(SessionError::InvalidPhase("no feedback is being shown"));
        }
        self.selected_question = None;
        self.user_answer = None;
        self.feedback = None;
        self.error = None;
        self.phase = SessionPhase::AwaitingQuestionSelection;
        Ok(())
    }

    /// Hard reset from any state. Bumps the epoch so in-flight completions
    /// are discarded when they eventually arrive.
    pub fn restart(&mut self) {
        info!("Restarting session");
        let epoch = self.epoch.wrapping_add(1);
        *self = Session::default();
        self.epoch = epoch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(confidence: u8) -> Feedback {
        Feedback {
            confidence,
            assessment: "Solid recall.".to_string(),
            comparison: "Covers most key points.".to_string(),
            suggestion1: "First model answer.".to_string(),
            suggestion2: "Second model answer.".to_string(),
            sources: Vec::new(),
        }
    }

    fn session_at_selection(pool: Vec<String>) -> Session {
        let mut session = Session::new();
        session.set_grade_level("Inspector").unwrap();
        let epoch = session.begin_upload().unwrap();
        session.text_extracted(epoch, "doc body".to_string());
        session.document_classified(epoch, Classification::classified(DocumentType::StudyMaterial));
        session.questions_ready(epoch, pool);
        session
    }

    #[test]
    fn upload_without_grade_is_a_local_validation_error() {
        let mut session = Session::new();
        let result = session.begin_upload();
        assert!(matches!(result, Err(SessionError::Validation(_))));
        assert_eq!(session.phase(), SessionPhase::AwaitingUpload);
        assert!(session.error().unwrap().contains("grade level"));
    }

    #[test]
    fn happy_path_reaches_feedback_and_appends_one_history_entry() {
        let mut session = session_at_selection(vec![
            "Q1".to_string(),
            "Q2".to_string(),
            "Q3".to_string(),
            "Q4".to_string(),
            "Q5".to_string(),
        ]);
        assert_eq!(session.phase(), SessionPhase::AwaitingQuestionSelection);
        assert_eq!(session.questions().len(), MAX_DISPLAYED_QUESTIONS);

        session.select_question(1).unwrap();
        let ticket = session.begin_evaluation("my answer").unwrap();
        assert_eq!(session.phase(), SessionPhase::Evaluating);
        assert_eq!(ticket.document_type, DocumentType::StudyMaterial);
        assert_eq!(ticket.source_text.as_deref(), Some("doc body"));

        session.evaluation_complete(ticket.epoch, feedback(82));
        assert_eq!(session.phase(), SessionPhase::ShowingFeedback);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].answer, "my answer");
        assert!(session.history()[0].feedback.confidence <= 100);
        assert!(session.questions()[1].feedback.is_some());
    }

    #[test]
    fn displayed_questions_never_exceed_pool_size() {
        let session = session_at_selection(vec!["Only one".to_string()]);
        assert_eq!(session.questions().len(), 1);
    }

    #[test]
    fn selected_index_is_always_valid() {
        let mut session = session_at_selection(vec!["Q1".to_string(), "Q2".to_string()]);
        assert!(session.select_question(5).is_err());
        assert_eq!(session.phase(), SessionPhase::AwaitingQuestionSelection);
        assert!(session.selected_question().is_none());

        session.select_question(0).unwrap();
        assert!(session.selected_question().unwrap() < session.questions().len());
    }

    #[test]
    fn stale_completion_after_restart_is_ignored() {
        let mut session = Session::new();
        session.set_grade_level("Inspector").unwrap();
        let epoch = session.begin_upload().unwrap();

        session.restart();
        session.text_extracted(epoch, "late arrival".to_string());

        assert_eq!(session.phase(), SessionPhase::AwaitingUpload);
        assert!(session.document_text().is_none());
    }

    #[test]
    fn restart_matches_a_fresh_session_in_every_field() {
        let mut session = session_at_selection(vec!["Q1".to_string(), "Q2".to_string()]);
        session.select_question(0).unwrap();
        let ticket = session.begin_evaluation("answer").unwrap();
        session.evaluation_complete(ticket.epoch, feedback(50));

        session.restart();
        let fresh = Session::new();
        assert_eq!(session.phase(), fresh.phase());
        assert_eq!(session.grade_level(), fresh.grade_level());
        assert_eq!(session.document_text(), fresh.document_text());
        assert_eq!(session.document_type(), fresh.document_type());
        assert_eq!(session.classification_defaulted(), fresh.classification_defaulted());
        assert_eq!(session.questions(), fresh.questions());
        assert_eq!(session.selected_question(), fresh.selected_question());
        assert_eq!(session.user_answer(), fresh.user_answer());
        assert_eq!(session.feedback(), fresh.feedback());
        assert_eq!(session.history(), fresh.history());
        assert_eq!(session.error(), fresh.error());
        assert_eq!(session.credential_blocked(), fresh.credential_blocked());
    }

    #[test]
    fn evaluation_failure_returns_to_answer_entry_keeping_selection() {
        let mut session = session_at_selection(vec!["Q1".to_string()]);
        session.select_question(0).unwrap();
        let ticket = session.begin_evaluation("answer").unwrap();

        session.pipeline_failed(
            ticket.epoch,
            PipelineError::EvaluationFailed(crate::error::BackendError::RateLimit),
        );
        assert_eq!(session.phase(), SessionPhase::AwaitingAnswer);
        assert_eq!(session.selected_question(), Some(0));
        assert!(session.error().unwrap().contains("Finish what you were doing."));
    }

    #[test]
    fn credential_failure_raises_banner_without_inline_error() {
        let mut session = session_at_selection(vec!["Q1".to_string()]);
        session.select_question(0).unwrap();
        let ticket = session.begin_evaluation("answer").unwrap();

        session.pipeline_failed(ticket.epoch, PipelineError::CredentialInvalid);
        assert_eq!(session.phase(), SessionPhase::AwaitingAnswer);
        assert!(session.credential_blocked());
        assert!(session.error().is_none());

        // Further pipeline actions are refused until the app is reloaded.
        assert!(session.begin_evaluation("retry").is_err());
    }

    #[test]
    fn pre_selection_failure_discards_document_state() {
        let mut session = Session::new();
        session.set_grade_level("Inspector").unwrap();
        let epoch = session.begin_upload().unwrap();
        session.text_extracted(epoch, "doc".to_string());

        session.pipeline_failed(epoch, PipelineError::NoQuestionsProduced);
        assert_eq!(session.phase(), SessionPhase::AwaitingUpload);
        assert!(session.document_text().is_none());
        assert!(session.questions().is_empty());
        // Grade survives a pipeline failure; only a full restart clears it.
        assert_eq!(session.grade_level(), Some("Inspector"));
    }

    #[test]
    fn answer_another_keeps_questions_and_history() {
        let mut session = session_at_selection(vec!["Q1".to_string(), "Q2".to_string()]);
        session.select_question(0).unwrap();
        let ticket = session.begin_evaluation("answer").unwrap();
        session.evaluation_complete(ticket.epoch, feedback(90));

        session.answer_another().unwrap();
        assert_eq!(session.phase(), SessionPhase::AwaitingQuestionSelection);
        assert_eq!(session.questions().len(), 2);
        assert_eq!(session.history().len(), 1);
        assert!(session.selected_question().is_none());
        assert!(session.feedback().is_none());
        assert!(session.user_answer().is_none());
    }

    #[test]
    fn grade_level_is_immutable_once_processing_starts() {
        let mut session = Session::new();
        session.set_grade_level("Inspector").unwrap();
        session.begin_upload().unwrap();
        assert!(session.set_grade_level("Director").is_err());
        assert_eq!(session.grade_level(), Some("Inspector"));
    }
}
