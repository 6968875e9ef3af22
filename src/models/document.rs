// file: src/models/document.rs
// description: immutable ingested document with content hash and metadata
// reference: internal data structures

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_path: Option<PathBuf>,
    pub content_type: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

/// Raw content of a document as delivered by the source.
#[derive(Debug, Clone)]
pub enum DocumentContent {
    Bytes(Vec<u8>),
    /// The source could not read the content; carries the reason.
    Unreadable(String),
}

/// One unit of input. Fields are private so a document cannot change once built.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    content: DocumentContent,
    metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        let metadata = DocumentMetadata {
            source_path: None,
            content_type: content_type.into(),
            content_hash: Self::compute_hash(&bytes),
            size_bytes: bytes.len() as u64,
        };

        Self {
            id: id.into(),
            content: DocumentContent::Bytes(bytes),
            metadata,
        }
    }

    pub fn from_file(id: impl Into<String>, path: &Path, bytes: Vec<u8>) -> Self {
        let mut document = Self::new(id, bytes, content_type_for(path));
        document.metadata.source_path = Some(path.to_path_buf());
        document
    }

    pub fn unreadable(id: impl Into<String>, path: &Path, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: DocumentContent::Unreadable(reason.into()),
            metadata: DocumentMetadata {
                source_path: Some(path.to_path_buf()),
                content_type: content_type_for(path).to_string(),
                content_hash: String::new(),
                size_bytes: 0,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn content_hash(&self) -> &str {
        &self.metadata.content_hash
    }

    /// Readable bytes, or `None` when the source failed to read the document.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            DocumentContent::Bytes(bytes) => Some(bytes),
            DocumentContent::Unreadable(_) => None,
        }
    }

    /// True for unreadable, zero-length and whitespace-only content.
    pub fn is_blank(&self) -> bool {
        match &self.content {
            DocumentContent::Bytes(bytes) => bytes.iter().all(|b| b.is_ascii_whitespace()),
            DocumentContent::Unreadable(_) => true,
        }
    }

    fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") | Some("markdown") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let doc = Document::new("doc-1", b"# Test Content".to_vec(), "text/markdown");

        assert_eq!(doc.id(), "doc-1");
        assert!(!doc.content_hash().is_empty());
        assert_eq!(doc.metadata().size_bytes, 14);
        assert!(!doc.is_blank());
    }

    #[test]
    fn test_hash_consistency() {
        let hash1 = Document::compute_hash(b"Test content");
        let hash2 = Document::compute_hash(b"Test content");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_blank_documents() {
        assert!(Document::new("a", Vec::new(), "text/plain").is_blank());
        assert!(Document::new("b", b" \n\t ".to_vec(), "text/plain").is_blank());

        let unreadable = Document::unreadable("c", Path::new("/x/c.pdf"), "permission denied");
        assert!(unreadable.is_blank());
        assert!(unreadable.bytes().is_none());
        assert_eq!(unreadable.metadata().content_type, "application/pdf");
    }

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(content_type_for(Path::new("paper.PDF")), "application/pdf");
        assert_eq!(content_type_for(Path::new("notes.txt")), "text/plain");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
