// file: src/runtime/mock.rs
// description: scripted in-process model runtime for dry runs and tests
// reference: deterministic mock backends with atomic call statistics

use crate::models::Payload;
use crate::runtime::{ModelRuntime, RuntimeError};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted reaction of the mock to a call for a given document.
#[derive(Debug, Clone)]
pub enum MockStep {
    Respond,
    Fail(RuntimeError),
    /// Sleep, then respond.
    Stall(Duration),
}

#[derive(Debug, Default)]
pub struct MockRuntimeStats {
    pub total_calls: AtomicU64,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

/// Echoing runtime whose per-document behavior can be scripted.
///
/// Calls for a document pop the next [`MockStep`] from its script; once the
/// script is exhausted every further call responds.
#[derive(Debug)]
pub struct MockRuntime {
    name: String,
    latency: Duration,
    scripts: Mutex<HashMap<String, VecDeque<MockStep>>>,
    calls: Mutex<HashMap<String, u32>>,
    stats: MockRuntimeStats,
}

impl MockRuntime {
    pub fn echo(name: &str) -> Self {
        Self {
            name: name.to_string(),
            latency: Duration::ZERO,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            stats: MockRuntimeStats::default(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_script(self, document_id: &str, steps: Vec<MockStep>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document_id.to_string(), steps.into());
        self
    }

    pub fn stats(&self) -> &MockRuntimeStats {
        &self.stats
    }

    pub fn total_calls(&self) -> u64 {
        self.stats.total_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, document_id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(document_id)
            .copied()
            .unwrap_or(0)
    }

    fn next_step(&self, document_id: &str) -> MockStep {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(document_id)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(MockStep::Respond)
    }

    fn respond(&self, document_id: &str, payload: &Payload) -> Payload {
        json!({
            "model": self.name,
            "document_id": document_id,
            "input": payload,
        })
    }
}

impl ModelRuntime for MockRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn infer(&self, payload: &Payload) -> Result<Payload, RuntimeError> {
        let document_id = payload
            .get("document_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        self.stats.total_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(document_id.clone())
            .or_insert(0) += 1;

        let current = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let output = match self.next_step(&document_id) {
            MockStep::Respond => Ok(self.respond(&document_id, payload)),
            MockStep::Fail(error) => Err(error),
            MockStep::Stall(delay) => {
                std::thread::sleep(delay);
                Ok(self.respond(&document_id, payload))
            }
        };

        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_response() {
        let mock = MockRuntime::echo("primary");
        let output = mock.infer(&json!({"document_id": "a"})).unwrap();

        assert_eq!(output["model"], "primary");
        assert_eq!(output["document_id"], "a");
        assert_eq!(mock.calls_for("a"), 1);
    }

    #[test]
    fn test_script_then_respond() {
        let mock = MockRuntime::echo("primary").with_script(
            "a",
            vec![MockStep::Fail(RuntimeError::ResourceExhausted("gpu".into()))],
        );

        assert!(mock.infer(&json!({"document_id": "a"})).is_err());
        assert!(mock.infer(&json!({"document_id": "a"})).is_ok());
        assert!(mock.infer(&json!({"document_id": "b"})).is_ok());
        assert_eq!(mock.calls_for("a"), 2);
        assert_eq!(mock.total_calls(), 3);
    }
}
