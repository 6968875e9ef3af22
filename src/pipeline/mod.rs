// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

mod coordinator;
mod progress;
mod state;

pub use coordinator::{PipelineCoordinator, RunCounters};
pub use progress::{PipelineStats, ProgressTracker};
pub use state::{DocumentLifecycle, DocumentState};
