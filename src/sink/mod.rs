// file: src/sink/mod.rs
// description: result sink contract and an in-memory implementation
// reference: internal module structure

pub mod jsonl;

pub use jsonl::{JsonlSink, ModelFingerprint, RunManifest};

use crate::error::Result;
use crate::models::DocumentResult;
use crate::pipeline::PipelineStats;
use std::collections::HashSet;

/// Receives each result as it is produced, in arbitrary order.
///
/// Implementations must tolerate a resumed run offering a result they already
/// hold; `accept` returns `false` for such duplicates.
pub trait ResultSink: Send {
    fn accept(&mut self, result: &DocumentResult) -> Result<bool>;

    fn finish(&mut self, _stats: &PipelineStats) -> Result<()> {
        Ok(())
    }
}

/// Keeps results in memory, deduplicated by document id and content hash.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Vec<DocumentResult>,
    seen: HashSet<(String, String)>,
    finished: Option<PipelineStats>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &[DocumentResult] {
        &self.results
    }

    pub fn get(&self, document_id: &str) -> Option<&DocumentResult> {
        self.results.iter().find(|r| r.document_id() == document_id)
    }

    pub fn final_stats(&self) -> Option<&PipelineStats> {
        self.finished.as_ref()
    }
}

impl ResultSink for CollectingSink {
    fn accept(&mut self, result: &DocumentResult) -> Result<bool> {
        let key = (
            result.document_id().to_string(),
            result.content_hash().to_string(),
        );
        if !self.seen.insert(key) {
            return Ok(false);
        }
        self.results.push(result.clone());
        Ok(true)
    }

    fn finish(&mut self, stats: &PipelineStats) -> Result<()> {
        self.finished = Some(stats.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageAttempts;
    use serde_json::json;

    #[test]
    fn test_collecting_sink_ignores_duplicates() {
        let result = DocumentResult::Completed {
            document_id: "a".to_string(),
            content_hash: "h1".to_string(),
            payload: json!({}),
            attempts: StageAttempts::default(),
        };

        let mut sink = CollectingSink::new();
        assert!(sink.accept(&result).unwrap());
        assert!(!sink.accept(&result).unwrap());
        assert_eq!(sink.results().len(), 1);
        assert!(sink.get("a").is_some());
    }
}
