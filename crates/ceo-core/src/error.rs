//! Crate-level error taxonomy.
//!
//! `ConfigError` covers construction and settings loading. `OperationError`
//! is the typed terminal failure of an autonomy-loop operation; it is
//! `Clone + Serialize` because it travels inside `OperationResult` and the
//! history buffer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::autonomy::OperationState;
use crate::decision::{PolicySeverity, PolicyViolation};
use crate::registry::RegistryError;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("agent registration failed: {0}")]
    Registry(#[from] RegistryError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Why an operation did not complete successfully.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationError {
    #[error("no capable agent: {reasoning}")]
    NoCapableAgent { reasoning: String },

    #[error("rejected by policy ({severity}): {reasoning}")]
    PolicyRejected {
        severity: PolicySeverity,
        reasoning: String,
        policies: Vec<PolicyViolation>,
    },

    #[error("estimated cost {estimated_cost:.2} exceeds cap {cost_cap:.2}")]
    CostCapExceeded { estimated_cost: f64, cost_cap: f64 },

    #[error("human approval required: {reasoning}")]
    ApprovalRequired { reasoning: String },

    #[error("execution failed after {attempts} attempt(s): {last_cause}")]
    ExecutionFailed { attempts: u32, last_cause: String },
}

impl OperationError {
    /// Stable snake_case name, matching the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCapableAgent { .. } => "no_capable_agent",
            Self::PolicyRejected { .. } => "policy_rejected",
            Self::CostCapExceeded { .. } => "cost_cap_exceeded",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::ExecutionFailed { .. } => "execution_failed",
        }
    }

    /// Terminal state an operation ends in when it fails with this error.
    pub fn terminal_state(&self) -> OperationState {
        match self {
            Self::CostCapExceeded { .. } => OperationState::CostRejected,
            Self::ExecutionFailed { .. } => OperationState::Failed,
            Self::NoCapableAgent { .. }
            | Self::PolicyRejected { .. }
            | Self::ApprovalRequired { .. } => OperationState::Blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_serde_tag() {
        let errors = [
            OperationError::NoCapableAgent {
                reasoning: "none".into(),
            },
            OperationError::CostCapExceeded {
                estimated_cost: 20.0,
                cost_cap: 10.0,
            },
            OperationError::ExecutionFailed {
                attempts: 3,
                last_cause: "boom".into(),
            },
        ];
        for err in errors {
            let json = serde_json::to_value(&err).unwrap();
            assert_eq!(json["kind"], err.kind());
        }
    }

    #[test]
    fn test_terminal_states() {
        let cost = OperationError::CostCapExceeded {
            estimated_cost: 20.0,
            cost_cap: 10.0,
        };
        assert_eq!(cost.terminal_state(), OperationState::CostRejected);

        let approval = OperationError::ApprovalRequired {
            reasoning: "trust".into(),
        };
        assert_eq!(approval.terminal_state(), OperationState::Blocked);
    }

    #[test]
    fn test_display_mentions_cap() {
        let err = OperationError::CostCapExceeded {
            estimated_cost: 150.0,
            cost_cap: 100.0,
        };
        assert_eq!(err.to_string(), "estimated cost 150.00 exceeds cap 100.00");
    }
}
