//! Structured observability for autonomy-loop operations.
//!
//! This module provides:
//! - an operation-scoped tracing span ([`operation_span`])
//! - the [`TelemetrySink`] seam and its default [`TracingSink`]
//! - [`dispatch`], which forwards an event and downgrades sink failures to a
//!   warning
//!
//! Events are emitted at `info!` level (filter with `CEO_LOG` or `RUST_LOG`).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::autonomy::OperationState;
use crate::decision::{AutonomyLevel, PolicySeverity};
use crate::registry::TrustUpdate;

/// Lifecycle events reported to a [`TelemetrySink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TelemetryEvent {
    #[serde(rename = "decision.made")]
    DecisionMade {
        operation_id: String,
        task_id: String,
        agent_id: Option<String>,
        autonomy_level: AutonomyLevel,
        should_proceed: bool,
    },
    #[serde(rename = "policy.violation")]
    PolicyViolation {
        operation_id: String,
        policy_id: String,
        severity: PolicySeverity,
        message: String,
    },
    #[serde(rename = "attempt.failed")]
    AttemptFailed {
        operation_id: String,
        agent_id: String,
        attempt: u32,
        cause: String,
    },
    #[serde(rename = "trust.updated")]
    TrustUpdated {
        operation_id: String,
        update: TrustUpdate,
    },
    #[serde(rename = "operation.finished")]
    OperationFinished {
        operation_id: String,
        task_id: String,
        success: bool,
        final_state: OperationState,
        attempts: u32,
        cost: f64,
        execution_time_ms: u64,
        cache_hit: bool,
    },
}

impl TelemetryEvent {
    /// Dotted event name, as used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DecisionMade { .. } => "decision.made",
            Self::PolicyViolation { .. } => "policy.violation",
            Self::AttemptFailed { .. } => "attempt.failed",
            Self::TrustUpdated { .. } => "trust.updated",
            Self::OperationFinished { .. } => "operation.finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("telemetry sink failed: {0}")]
pub struct SinkError(pub String);

/// Receives lifecycle events. Failures never abort an operation.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent) -> Result<(), SinkError>;
}

/// Default sink: one structured `tracing` event per lifecycle event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), SinkError> {
        match event {
            TelemetryEvent::DecisionMade {
                operation_id,
                task_id,
                agent_id,
                autonomy_level,
                should_proceed,
            } => info!(
                event = "decision.made",
                operation_id = %operation_id,
                task_id = %task_id,
                agent_id = agent_id.as_deref().unwrap_or("-"),
                autonomy_level = %autonomy_level,
                should_proceed = *should_proceed,
            ),
            TelemetryEvent::PolicyViolation {
                operation_id,
                policy_id,
                severity,
                message,
            } => warn!(
                event = "policy.violation",
                operation_id = %operation_id,
                policy_id = %policy_id,
                severity = %severity,
                message = %message,
            ),
            TelemetryEvent::AttemptFailed {
                operation_id,
                agent_id,
                attempt,
                cause,
            } => warn!(
                event = "attempt.failed",
                operation_id = %operation_id,
                agent_id = %agent_id,
                attempt = *attempt,
                cause = %cause,
            ),
            TelemetryEvent::TrustUpdated {
                operation_id,
                update,
            } => info!(
                event = "trust.updated",
                operation_id = %operation_id,
                agent_id = %update.agent_id,
                success = update.success,
                trust_before = update.trust_before,
                trust_after = update.trust_after,
            ),
            TelemetryEvent::OperationFinished {
                operation_id,
                task_id,
                success,
                final_state,
                attempts,
                cost,
                execution_time_ms,
                cache_hit,
            } => info!(
                event = "operation.finished",
                operation_id = %operation_id,
                task_id = %task_id,
                success = *success,
                final_state = %final_state,
                attempts = *attempts,
                cost = *cost,
                execution_time_ms = *execution_time_ms,
                cache_hit = *cache_hit,
            ),
        }
        Ok(())
    }
}

/// Forward `event` to `sink`, logging instead of failing on sink errors.
pub fn dispatch(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    if let Err(err) = sink.record(&event) {
        warn!(event = "telemetry.sink_error", kind = event.name(), error = %err);
    }
}

/// Span covering one operation; attach with `tracing::Instrument`.
pub fn operation_span(operation_id: &str, task_id: &str) -> tracing::Span {
    tracing::info_span!("ceo.operation", operation_id = %operation_id, task_id = %task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl TelemetrySink for Broken {
        fn record(&self, _event: &TelemetryEvent) -> Result<(), SinkError> {
            Err(SinkError("disk full".into()))
        }
    }

    fn finished() -> TelemetryEvent {
        TelemetryEvent::OperationFinished {
            operation_id: "op-1".into(),
            task_id: "t-1".into(),
            success: true,
            final_state: OperationState::Succeeded,
            attempts: 1,
            cost: 3.5,
            execution_time_ms: 12,
            cache_hit: false,
        }
    }

    #[test]
    fn test_event_tag_matches_name() {
        let event = finished();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["final_state"], "succeeded");
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        assert!(TracingSink.record(&finished()).is_ok());
    }

    #[test]
    fn test_dispatch_swallows_sink_errors() {
        dispatch(&Broken, finished());
    }

    #[test]
    fn test_operation_span_create() {
        let span = operation_span("op-1", "t-1");
        let _entered = span.enter();
    }
}
