// file: src/models/stage.rs
// description: stage identity, stage input construction and tagged stage output
// reference: internal data structures

use crate::error::StageError;
use crate::models::Document;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Structured data exchanged with a model runtime. Opaque to the coordinator.
pub type Payload = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Primary,
    PostProcessing,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Primary => "primary",
            StageKind::PostProcessing => "post_processing",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document plus the previous stage's payload (absent for the primary stage).
#[derive(Debug, Clone)]
pub struct StageInput {
    pub document: Arc<Document>,
    pub previous: Option<Payload>,
}

impl StageInput {
    pub fn primary(document: Arc<Document>) -> Self {
        Self {
            document,
            previous: None,
        }
    }

    pub fn post_processing(document: Arc<Document>, primary_output: Payload) -> Self {
        Self {
            document,
            previous: Some(primary_output),
        }
    }

    /// Checks the input is well-formed for `stage` before any model call.
    pub fn validate(&self, stage: StageKind) -> Result<(), StageError> {
        match stage {
            StageKind::Primary => {
                if let Some(reason) = self.unreadable_reason() {
                    return Err(StageError::invalid_input(format!(
                        "document {} is unreadable: {}",
                        self.document.id(),
                        reason
                    )));
                }
                if self.document.is_blank() {
                    return Err(StageError::invalid_input(format!(
                        "document {} has empty content",
                        self.document.id()
                    )));
                }
            }
            StageKind::PostProcessing => match &self.previous {
                None | Some(Payload::Null) => {
                    return Err(StageError::invalid_input(format!(
                        "document {} has no primary output to post-process",
                        self.document.id()
                    )));
                }
                Some(_) => {}
            },
        }
        Ok(())
    }

    /// Builds the JSON request handed to the model runtime for `stage`.
    pub fn to_payload(&self, stage: StageKind) -> Payload {
        let metadata = serde_json::to_value(self.document.metadata()).unwrap_or(Payload::Null);

        match stage {
            StageKind::Primary => {
                let (content, encoding) = self.encoded_content();
                json!({
                    "document_id": self.document.id(),
                    "content": content,
                    "encoding": encoding,
                    "metadata": metadata,
                })
            }
            StageKind::PostProcessing => json!({
                "document_id": self.document.id(),
                "metadata": metadata,
                "primary": self.previous.clone().unwrap_or(Payload::Null),
            }),
        }
    }

    fn unreadable_reason(&self) -> Option<&str> {
        match self.document.content() {
            crate::models::DocumentContent::Unreadable(reason) => Some(reason),
            crate::models::DocumentContent::Bytes(_) => None,
        }
    }

    fn encoded_content(&self) -> (String, &'static str) {
        let bytes = self.document.bytes().unwrap_or_default();
        let content_type = &self.document.metadata().content_type;
        let textual = content_type.starts_with("text/") || content_type == "application/json";

        match std::str::from_utf8(bytes) {
            Ok(text) if textual => (text.to_string(), "utf8"),
            _ => (STANDARD.encode(bytes), "base64"),
        }
    }
}

/// Outcome of one stage, after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Success { payload: Payload, attempts: u32 },
    Failure { error: StageError, attempts: u32 },
}

impl StageOutput {
    pub fn attempts(&self) -> u32 {
        match self {
            StageOutput::Success { attempts, .. } | StageOutput::Failure { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutput::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::path::Path;

    #[test]
    fn test_primary_rejects_empty_document() {
        let input = StageInput::primary(Arc::new(Document::new("a", Vec::new(), "text/plain")));
        let err = input.validate(StageKind::Primary).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_primary_rejects_unreadable_document() {
        let doc = Document::unreadable("b", Path::new("b.pdf"), "truncated file");
        let err = StageInput::primary(Arc::new(doc))
            .validate(StageKind::Primary)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert!(err.message.contains("truncated file"));
    }

    #[test]
    fn test_post_processing_requires_previous_payload() {
        let doc = Arc::new(Document::new("c", b"text".to_vec(), "text/plain"));
        let missing = StageInput::primary(doc.clone());
        assert!(missing.validate(StageKind::PostProcessing).is_err());

        let null = StageInput::post_processing(doc.clone(), Payload::Null);
        assert!(null.validate(StageKind::PostProcessing).is_err());

        let present = StageInput::post_processing(doc, json!({"regions": []}));
        assert!(present.validate(StageKind::PostProcessing).is_ok());
    }

    #[test]
    fn test_payload_encoding() {
        let text = StageInput::primary(Arc::new(Document::new("t", b"hello".to_vec(), "text/plain")));
        let payload = text.to_payload(StageKind::Primary);
        assert_eq!(payload["content"], "hello");
        assert_eq!(payload["encoding"], "utf8");

        let binary = StageInput::primary(Arc::new(Document::new(
            "p",
            vec![0x25, 0x50, 0x44, 0x46],
            "application/pdf",
        )));
        let payload = binary.to_payload(StageKind::Primary);
        assert_eq!(payload["encoding"], "base64");
        assert_eq!(payload["content"], "JVBERg==");
    }

    #[test]
    fn test_post_processing_payload_wraps_primary_output() {
        let doc = Arc::new(Document::new("d", b"x".to_vec(), "text/plain"));
        let input = StageInput::post_processing(doc, json!({"label": "table"}));
        let payload = input.to_payload(StageKind::PostProcessing);
        assert_eq!(payload["document_id"], "d");
        assert_eq!(payload["primary"]["label"], "table");
    }
}
