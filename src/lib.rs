pub mod backend;
pub mod clients;
pub mod coach;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod prompts;
pub mod session;

// Convenient re-exports
pub use backend::{GenerativeBackend, SourceRef};
pub use coach::StudyCoach;
pub use error::{BackendError, PipelineError, SessionError};
pub use pipeline::{Pipeline, UploadedFile};
pub use session::{DocumentType, Feedback, HistoryEntry, Question, Session, SessionPhase};
