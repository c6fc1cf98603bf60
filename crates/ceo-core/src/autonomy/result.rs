use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::CeoDecision;
use crate::error::OperationError;

use super::state::OperationState;

/// Terminal record of one `execute_operation` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation_id: String,
    pub task_id: String,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    /// Cost billed by the adapter; 0 for cache hits and pre-execution stops.
    pub cost: f64,
    pub execution_time_ms: u64,
    /// Adapter attempts made; 0 when no adapter call happened.
    pub attempts: u32,
    pub cache_hit: bool,
    pub final_state: OperationState,
    pub decisions_applied: Vec<CeoDecision>,
    /// Human-readable notes accumulated during the operation.
    pub errors: Vec<String>,
    pub failure: Option<OperationError>,
    pub completed_at: DateTime<Utc>,
}

impl OperationResult {
    /// The agent chosen by the first applied decision, if any.
    pub fn selected_agent_id(&self) -> Option<&str> {
        self.decisions_applied
            .first()
            .and_then(|d| d.selected_agent.as_ref())
            .map(|a| a.agent_id.as_str())
    }
}
