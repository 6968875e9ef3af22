// file: src/stage/mod.rs
// description: stage execution module exports
// reference: internal module structure

mod executor;
mod retry;

pub use executor::StageExecutor;
pub use retry::{RetryOutcome, RetryPolicy, retry_with_policy};
