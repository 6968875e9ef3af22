// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod document;
pub mod result;
pub mod stage;

pub use document::{Document, DocumentContent, DocumentMetadata};
pub use result::{DocumentResult, StageAttempts};
pub use stage::{Payload, StageInput, StageKind, StageOutput};
