// file: src/models/result.rs
// description: final per-document outcome handed to the result sink
// reference: internal data structures

use crate::error::{ErrorKind, StageError};
use crate::models::{Payload, StageKind};
use serde::{Deserialize, Serialize};

/// Model invocations recorded per stage for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAttempts {
    pub primary: u32,
    pub post_processing: u32,
}

impl StageAttempts {
    pub fn total(&self) -> u32 {
        self.primary + self.post_processing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentResult {
    Completed {
        document_id: String,
        content_hash: String,
        payload: Payload,
        attempts: StageAttempts,
    },
    Failed {
        document_id: String,
        content_hash: String,
        stage: StageKind,
        error: StageError,
        attempts: StageAttempts,
    },
}

impl DocumentResult {
    pub fn document_id(&self) -> &str {
        match self {
            DocumentResult::Completed { document_id, .. }
            | DocumentResult::Failed { document_id, .. } => document_id,
        }
    }

    pub fn content_hash(&self) -> &str {
        match self {
            DocumentResult::Completed { content_hash, .. }
            | DocumentResult::Failed { content_hash, .. } => content_hash,
        }
    }

    pub fn attempts(&self) -> StageAttempts {
        match self {
            DocumentResult::Completed { attempts, .. }
            | DocumentResult::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DocumentResult::Completed { .. })
    }

    pub fn failed_stage(&self) -> Option<StageKind> {
        match self {
            DocumentResult::Failed { stage, .. } => Some(*stage),
            DocumentResult::Completed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            DocumentResult::Failed { error, .. } => Some(error.kind),
            DocumentResult::Completed { .. } => None,
        }
    }
}
