use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{GenerateRequest, GenerateResponse, GenerativeBackend, SourceRef};
use crate::error::BackendError;

/// A scripted backend reply.
#[derive(Debug)]
pub enum MockReply {
    Text(String),
    Grounded { text: String, sources: Vec<SourceRef> },
    Error(BackendError),
}

/// Shared handle for scripting a [`MockBackend`] and inspecting the requests
/// it received.
#[derive(Debug, Default)]
pub struct MockHandle {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockHandle {
    pub fn add_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn add_text(&self, text: impl Into<String>) {
        self.add_reply(MockReply::Text(text.into()));
    }

    /// Number of requests the backend has executed so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Snapshot of every request received, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Mock backend for tests: pops scripted replies in order and records every
/// request for later assertions.
#[derive(Debug, Clone)]
pub struct MockBackend {
    handle: Arc<MockHandle>,
}

impl MockBackend {
    pub fn new() -> (Self, Arc<MockHandle>) {
        let handle = Arc::new(MockHandle::default());
        (Self { handle: handle.clone() }, handle)
    }

    pub fn with_replies(replies: Vec<MockReply>) -> (Self, Arc<MockHandle>) {
        let (backend, handle) = Self::new();
        for reply in replies {
            handle.add_reply(reply);
        }
        (backend, handle)
    }
}

#[async_trait]
impl GenerativeBackend for MockBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, BackendError> {
        self.handle.requests.lock().unwrap().push(request);

        let reply = self.handle.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(GenerateResponse::from_text(text)),
            Some(MockReply::Grounded { text, sources }) => Ok(GenerateResponse { text, sources }),
            Some(MockReply::Error(err)) => Err(err),
            None => Err(BackendError::Mock("no scripted reply left".to_string())),
        }
    }

    fn clone_box(&self) -> Box<dyn GenerativeBackend> {
        Box::new(self.clone())
    }
}
