//! Operation orchestration on top of the decision engine.
//!
//! # Module layout
//!
//! - [`runner`]: `AutonomyLoop` (gates, cached and retried execution, learning)
//! - [`retry`]: per-attempt timeout and bounded retry
//! - [`state`]: `OperationState` machine
//! - [`history`]: bounded result buffer and `AutonomyStats`
//! - [`result`]: `OperationResult`

pub mod history;
pub mod result;
pub mod retry;
pub mod runner;
pub mod state;

pub use history::{AutonomyStats, OperationHistory};
pub use result::OperationResult;
pub use retry::{execute_with_retry, RetryExhausted, RetryPolicy};
pub use runner::AutonomyLoop;
pub use state::{IllegalTransition, OperationState, StateTracker};
