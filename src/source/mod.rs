// file: src/source/mod.rs
// description: document source module exports
// reference: internal module structure

pub mod directory;

pub use directory::{DirectorySource, ScannedFile};

use crate::models::Document;
use futures::future;
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use tracing::debug;

/// Drops documents whose id and content hash match a completed result,
/// calling `on_skip` for each one dropped.
pub fn skip_completed<S, F>(
    documents: S,
    completed: HashMap<String, String>,
    mut on_skip: F,
) -> impl Stream<Item = Document>
where
    S: Stream<Item = Document>,
    F: FnMut(&Document),
{
    documents.filter(move |document| {
        let done = completed
            .get(document.id())
            .is_some_and(|hash| hash == document.content_hash());
        if done {
            debug!("Already completed, skipping {}", document.id());
            on_skip(document);
        }
        future::ready(!done)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_skip_completed_keeps_changed_documents() {
        let unchanged = Document::new("a", b"same".to_vec(), "text/plain");
        let changed = Document::new("b", b"new text".to_vec(), "text/plain");
        let fresh = Document::new("c", b"other".to_vec(), "text/plain");

        let mut completed = HashMap::new();
        completed.insert("a".to_string(), unchanged.content_hash().to_string());
        completed.insert("b".to_string(), "stale-hash".to_string());

        let mut skipped = Vec::new();
        let ids: Vec<String> = tokio_test::block_on(
            skip_completed(
                stream::iter(vec![unchanged, changed, fresh]),
                completed,
                |d| skipped.push(d.id().to_string()),
            )
            .map(|d| d.id().to_string())
            .collect(),
        );

        assert_eq!(ids, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(skipped, vec!["a".to_string()]);
    }
}
