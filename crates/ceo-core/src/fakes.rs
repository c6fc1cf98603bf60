//! In-memory fakes for the adapter and telemetry seams.
//!
//! `SimulatedAdapter` stands in for real providers in the CLI and demos;
//! `ScriptedAdapter`, `RecordingSink` and `FailingSink` are test doubles.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{AdapterError, AdapterResponse, AdapterResult, AgentAdapter, AgentRequest};
use crate::obs::{SinkError, TelemetryEvent, TelemetrySink};
use crate::registry::CapabilityRegistry;

// ---------------------------------------------------------------------------
// SimulatedAdapter
// ---------------------------------------------------------------------------

/// Answers every call with a canned payload priced and scored from the
/// registry entry of the agent it was routed to.
#[derive(Debug)]
pub struct SimulatedAdapter {
    registry: Arc<CapabilityRegistry>,
    latency: Duration,
    fail_every: Option<u64>,
    calls: AtomicU64,
}

impl SimulatedAdapter {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            latency: Duration::from_millis(100),
            fail_every: None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every `n`th call with a transient error.
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentAdapter for SimulatedAdapter {
    async fn execute(&self, agent_id: &str, request: &AgentRequest) -> AdapterResult<AdapterResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(AdapterError::Transient(format!(
                "simulated failure on call {call}"
            )));
        }

        let agent = self
            .registry
            .get(agent_id)
            .ok_or_else(|| AdapterError::Unroutable(agent_id.to_string()))?;

        Ok(AdapterResponse {
            output: serde_json::json!({
                "agent_id": agent.id,
                "agent_name": agent.name,
                "category": agent.category,
                "task": request.task,
                "result": format!("{} completed task {}", agent.name, request.task_id),
            }),
            observed_quality: agent.success_rate,
            cost: agent.cost_per_call,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedAdapter
// ---------------------------------------------------------------------------

/// Fails a fixed number of times, then succeeds with a fixed response.
#[derive(Debug)]
pub struct ScriptedAdapter {
    failures_left: AtomicU32,
    delay: Duration,
    response: AdapterResponse,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    pub fn succeeding() -> Self {
        Self::failing_times(0)
    }

    pub fn failing_times(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            delay: Duration::ZERO,
            response: AdapterResponse {
                output: serde_json::json!({"ok": true}),
                observed_quality: 90.0,
                cost: 1.0,
            },
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    /// Sleep this long inside every call, before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_response(mut self, response: AdapterResponse) -> Self {
        self.response = response;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAdapter {
    async fn execute(&self, agent_id: &str, request: &AgentRequest) -> AdapterResult<AdapterResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AdapterError::Transient(format!(
                "scripted failure for {agent_id} on attempt {}",
                request.attempt
            )));
        }
        Ok(self.response.clone())
    }
}

// ---------------------------------------------------------------------------
// Telemetry sinks
// ---------------------------------------------------------------------------

/// Keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of recorded events, in arrival order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(TelemetryEvent::name).collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Rejects every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSink;

impl TelemetrySink for FailingSink {
    fn record(&self, _event: &TelemetryEvent) -> Result<(), SinkError> {
        Err(SinkError("sink unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::registry::{AgentCapability, AgentCategory};

    fn request(attempt: u32) -> AgentRequest {
        AgentRequest {
            operation_id: "op".into(),
            task_id: "t-1".into(),
            task: "write".into(),
            category: AgentCategory::Content,
            constraints: BTreeMap::new(),
            attempt,
        }
    }

    #[tokio::test]
    async fn test_scripted_adapter_fails_then_succeeds() {
        let adapter = ScriptedAdapter::failing_times(2);
        assert!(adapter.execute("a", &request(1)).await.is_err());
        assert!(adapter.execute("a", &request(2)).await.is_err());
        assert!(adapter.execute("a", &request(3)).await.is_ok());
        assert_eq!(adapter.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_adapter_uses_registry_pricing() {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register_agent(
                AgentCapability::new("w1", "Writer", AgentCategory::Content)
                    .with_cost(12.0)
                    .with_scores(80.0, 88.0)
                    .with_specializations(["blog"]),
            )
            .unwrap();
        let adapter = SimulatedAdapter::new(Arc::clone(&registry));

        let response = adapter.execute("w1", &request(1)).await.unwrap();
        assert!((response.cost - 12.0).abs() < f64::EPSILON);
        assert!((response.observed_quality - 88.0).abs() < f64::EPSILON);
        assert_eq!(response.output["agent_id"], "w1");

        assert!(matches!(
            adapter.execute("ghost", &request(1)).await,
            Err(AdapterError::Unroutable(_))
        ));
    }

    #[tokio::test]
    async fn test_simulated_adapter_fail_every() {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register_agent(AgentCapability::new("a", "A", AgentCategory::Data).with_specializations(["sql"]))
            .unwrap();
        let adapter = SimulatedAdapter::new(registry)
            .with_latency(Duration::ZERO)
            .with_fail_every(2);
        assert!(adapter.execute("a", &request(1)).await.is_ok());
        assert!(adapter.execute("a", &request(2)).await.is_err());
        assert_eq!(adapter.calls(), 2);
    }
}
