//! Per-operation state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Deciding,
    PolicyCheck,
    Executing,
    Blocked,
    CostRejected,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Blocked | Self::CostRejected | Self::Succeeded | Self::Failed
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Pending, Deciding)
                | (Deciding, PolicyCheck)
                | (PolicyCheck, Blocked)
                | (PolicyCheck, CostRejected)
                | (PolicyCheck, Executing)
                | (Executing, Succeeded)
                | (Executing, Failed)
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Deciding => "deciding",
            Self::PolicyCheck => "policy_check",
            Self::Executing => "executing",
            Self::Blocked => "blocked",
            Self::CostRejected => "cost_rejected",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal operation transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: OperationState,
    pub to: OperationState,
}

/// Tracks one operation's state and rejects illegal moves.
#[derive(Debug, Clone)]
pub struct StateTracker {
    operation_id: String,
    state: OperationState,
}

impl StateTracker {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            state: OperationState::Pending,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn advance(&mut self, next: OperationState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            operation_id = %self.operation_id,
            from = %self.state,
            to = %next,
            "state transition"
        );
        self.state = next;
        Ok(())
    }

    /// Walk forward through the intermediate states to a terminal one.
    ///
    /// The loop can stop before reaching `PolicyCheck`; the recorded path
    /// still passes through it so every terminal state is reached by a legal
    /// sequence.
    pub fn finish(&mut self, terminal: OperationState) -> Result<(), IllegalTransition> {
        let path: &[OperationState] = match terminal {
            OperationState::Succeeded | OperationState::Failed => &[
                OperationState::Deciding,
                OperationState::PolicyCheck,
                OperationState::Executing,
            ],
            _ => &[OperationState::Deciding, OperationState::PolicyCheck],
        };
        for step in path {
            if self.state != *step && self.state.can_transition_to(*step) {
                self.advance(*step)?;
            }
        }
        self.advance(terminal)
    }
}
