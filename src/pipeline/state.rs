// file: src/pipeline/state.rs
// description: per-document lifecycle state machine
// reference: Queued -> PrimaryRunning -> PrimarySucceeded -> PostRunning -> terminal

use crate::models::StageKind;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Queued,
    PrimaryRunning,
    PrimarySucceeded,
    PostRunning,
    Completed,
    Failed(StageKind),
}

impl DocumentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentState::Completed | DocumentState::Failed(_))
    }

    pub fn can_transition_to(self, next: DocumentState) -> bool {
        use DocumentState::*;

        matches!(
            (self, next),
            (Queued, PrimaryRunning)
                | (PrimaryRunning, PrimarySucceeded)
                | (PrimaryRunning, Failed(StageKind::Primary))
                | (PrimarySucceeded, PostRunning)
                | (PostRunning, Completed)
                | (PostRunning, Failed(StageKind::PostProcessing))
        )
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Queued => f.write_str("queued"),
            DocumentState::PrimaryRunning => f.write_str("primary_running"),
            DocumentState::PrimarySucceeded => f.write_str("primary_succeeded"),
            DocumentState::PostRunning => f.write_str("post_running"),
            DocumentState::Completed => f.write_str("completed"),
            DocumentState::Failed(stage) => write!(f, "failed({})", stage),
        }
    }
}

/// Tracks one document through its states, logging each transition.
#[derive(Debug)]
pub struct DocumentLifecycle<'a> {
    document_id: &'a str,
    state: DocumentState,
}

impl<'a> DocumentLifecycle<'a> {
    pub fn new(document_id: &'a str) -> Self {
        Self {
            document_id,
            state: DocumentState::Queued,
        }
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn advance(&mut self, next: DocumentState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {} for {}",
            self.state,
            next,
            self.document_id
        );
        debug!("{}: {} -> {}", self.document_id, self.state, next);
        self.state = next;
    }
}
