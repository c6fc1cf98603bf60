//! The autonomy loop: decide, gate, execute with retry, learn, record.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::adapter::{AgentAdapter, AgentRequest};
use crate::cache::{CacheRequest, CachedOutput, ExecutionCache};
use crate::config::{AutonomyConfig, OrchestratorSettings};
use crate::context::ExecutionContext;
use crate::decision::{
    AutonomyLevel, CeoDecision, DecisionEngine, EnforcementLevel, EngineConfig, PolicySeverity,
    SelectedAgent,
};
use crate::error::{ConfigError, ConfigResult, OperationError};
use crate::metrics::{LoopMetrics, MetricsSnapshot};
use crate::obs::{self, TelemetryEvent, TelemetrySink, TracingSink};
use crate::registry::{
    AgentCapability, CapabilityRegistry, RegistryResult, TrustConfig, TrustTracker,
};

use super::history::{AutonomyStats, OperationHistory};
use super::result::OperationResult;
use super::retry::{execute_with_retry, RetryPolicy};
use super::state::{OperationState, StateTracker};

/// How an operation ended, before it is stamped into an [`OperationResult`].
struct Outcome {
    terminal: OperationState,
    output: Option<serde_json::Value>,
    cost: f64,
    attempts: u32,
    cache_hit: bool,
    failure: Option<OperationError>,
}

impl Outcome {
    fn failed(failure: OperationError, attempts: u32) -> Self {
        Self {
            terminal: failure.terminal_state(),
            output: None,
            cost: 0.0,
            attempts,
            cache_hit: false,
            failure: Some(failure),
        }
    }
}

/// Shared orchestrator. Wrap in an `Arc` and call
/// [`execute_operation`](Self::execute_operation) from as many tasks as needed.
pub struct AutonomyLoop {
    registry: Arc<CapabilityRegistry>,
    engine: DecisionEngine,
    trust: TrustTracker,
    adapter: Arc<dyn AgentAdapter>,
    cache: Option<Arc<ExecutionCache>>,
    sink: Arc<dyn TelemetrySink>,
    config: RwLock<AutonomyConfig>,
    history: Mutex<OperationHistory>,
    metrics: LoopMetrics,
}

impl AutonomyLoop {
    /// A loop with default engine and trust settings and a default-sized cache.
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        adapter: Arc<dyn AgentAdapter>,
        config: AutonomyConfig,
    ) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: DecisionEngine::new(Arc::clone(&registry), EngineConfig::default())?,
            trust: TrustTracker::new(Arc::clone(&registry), TrustConfig::default())?,
            registry,
            adapter,
            cache: Some(Arc::new(ExecutionCache::default())),
            sink: Arc::new(TracingSink),
            history: Mutex::new(OperationHistory::new(config.history_capacity)),
            config: RwLock::new(config),
            metrics: LoopMetrics::new(),
        })
    }

    /// Build the registry and every component from a settings file.
    pub fn from_settings(
        settings: &OrchestratorSettings,
        adapter: Arc<dyn AgentAdapter>,
    ) -> ConfigResult<Self> {
        let registry = settings.build_registry()?;
        Self::from_settings_with_registry(settings, registry, adapter)
    }

    /// Like [`from_settings`](Self::from_settings), over a registry the caller
    /// already shares with the adapter. `settings.agents` is not re-registered.
    pub fn from_settings_with_registry(
        settings: &OrchestratorSettings,
        registry: Arc<CapabilityRegistry>,
        adapter: Arc<dyn AgentAdapter>,
    ) -> ConfigResult<Self> {
        settings.validate()?;
        let lp = Self::new(registry, adapter, settings.autonomy.clone())?
            .with_engine_config(settings.engine.clone())?
            .with_trust_config(settings.trust.clone())?;
        Ok(if settings.cache.enabled {
            lp.with_cache(Arc::new(ExecutionCache::new(settings.cache.capacity)))
        } else {
            lp.without_cache()
        })
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> ConfigResult<Self> {
        self.engine = DecisionEngine::new(Arc::clone(&self.registry), config)?;
        Ok(self)
    }

    pub fn with_trust_config(mut self, config: TrustConfig) -> ConfigResult<Self> {
        self.trust = TrustTracker::new(Arc::clone(&self.registry), config)?;
        Ok(self)
    }

    pub fn with_cache(mut self, cache: Arc<ExecutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the runtime configuration. Operations already running keep
    /// the snapshot they started with.
    pub fn configure(&self, config: AutonomyConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.lock_history().set_capacity(config.history_capacity);
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn config(&self) -> AutonomyConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn trust(&self) -> &TrustTracker {
        &self.trust
    }

    pub fn cache(&self) -> Option<&Arc<ExecutionCache>> {
        self.cache.as_ref()
    }

    pub fn metrics(&self) -> &LoopMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn register_agent(&self, capability: AgentCapability) -> RegistryResult<()> {
        self.registry.register_agent(capability)
    }

    pub fn make_decision(&self, context: &ExecutionContext) -> CeoDecision {
        self.engine.make_decision(context)
    }

    /// Run one task end to end. Never panics on operational failure; the
    /// returned result carries the typed cause in `failure`.
    pub async fn execute_operation(&self, context: &ExecutionContext) -> OperationResult {
        let operation_id = Uuid::new_v4().to_string();
        let span = obs::operation_span(&operation_id, &context.task_id);
        self.run_operation(operation_id, context)
            .instrument(span)
            .await
    }

    /// The last `limit` results, oldest first.
    pub fn get_history(&self, limit: usize) -> Vec<OperationResult> {
        self.lock_history().recent(limit)
    }

    pub fn get_stats(&self) -> AutonomyStats {
        self.lock_history().stats()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
        info!(event = "history.cleared");
    }

    async fn run_operation(&self, operation_id: String, context: &ExecutionContext) -> OperationResult {
        let started = Instant::now();
        let config = self.config();
        self.metrics.inc_operations();

        let mut tracker = StateTracker::new(operation_id.as_str());
        self.advance(&mut tracker, OperationState::Deciding);

        let decision = self.engine.make_decision(context);
        self.report_decision(&operation_id, context, &decision);
        self.advance(&mut tracker, OperationState::PolicyCheck);

        let mut errors = Vec::new();
        let gated = gate(&decision, context, &config, &mut errors).map(SelectedAgent::clone);
        let selected = match gated {
            Ok(selected) => selected,
            Err(failure) => {
                match failure {
                    OperationError::CostCapExceeded { .. } => self.metrics.inc_cost_rejections(),
                    _ => self.metrics.inc_policy_rejections(),
                }
                return self.finish(
                    tracker,
                    context,
                    decision,
                    errors,
                    Outcome::failed(failure, 0),
                    started,
                );
            }
        };

        self.advance(&mut tracker, OperationState::Executing);
        let outcome = self
            .execute_selected(&operation_id, context, &selected, &config)
            .await;
        self.finish(tracker, context, decision, errors, outcome, started)
    }

    async fn execute_selected(
        &self,
        operation_id: &str,
        context: &ExecutionContext,
        selected: &SelectedAgent,
        config: &AutonomyConfig,
    ) -> Outcome {
        let request = CacheRequest::from_context(selected.category, context);

        if let Some(hit) = self.cache.as_ref().and_then(|cache| cache.get(&request)) {
            self.metrics.inc_cache_hits();
            info!(event = "cache.hit", agent_id = %hit.agent_id);
            return Outcome {
                terminal: OperationState::Succeeded,
                output: Some(hit.output),
                cost: 0.0,
                attempts: 0,
                cache_hit: true,
                failure: None,
            };
        }

        let policy = RetryPolicy::from_config(config, context.time_budget_ms);
        let agent_id = selected.agent_id.as_str();

        let result = execute_with_retry(
            &policy,
            |attempt, err| {
                if attempt < policy.max_attempts {
                    self.metrics.inc_retries();
                }
                self.emit(TelemetryEvent::AttemptFailed {
                    operation_id: operation_id.to_string(),
                    agent_id: agent_id.to_string(),
                    attempt,
                    cause: err.to_string(),
                });
            },
            |attempt| {
                self.metrics.inc_adapter_calls();
                let request = AgentRequest {
                    operation_id: operation_id.to_string(),
                    task_id: context.task_id.clone(),
                    task: context.task.clone(),
                    category: selected.category,
                    constraints: context.constraints.clone(),
                    attempt,
                };
                let adapter = Arc::clone(&self.adapter);
                async move { adapter.execute(agent_id, &request).await }
            },
        )
        .await;

        match result {
            Ok((response, attempts)) => {
                if let Some(cache) = &self.cache {
                    cache.put(
                        &request,
                        CachedOutput {
                            agent_id: agent_id.to_string(),
                            output: response.output.clone(),
                            cost: response.cost,
                            quality: response.observed_quality,
                            cached_at: Utc::now(),
                        },
                    );
                }
                if config.learning_enabled {
                    self.learn(operation_id, agent_id, true, response.observed_quality);
                }
                Outcome {
                    terminal: OperationState::Succeeded,
                    output: Some(response.output),
                    cost: response.cost,
                    attempts,
                    cache_hit: false,
                    failure: None,
                }
            }
            Err(exhausted) => {
                if config.learning_enabled {
                    self.learn(operation_id, agent_id, false, 0.0);
                }
                Outcome::failed(
                    OperationError::ExecutionFailed {
                        attempts: exhausted.attempts,
                        last_cause: exhausted.last_error.to_string(),
                    },
                    exhausted.attempts,
                )
            }
        }
    }

    fn learn(&self, operation_id: &str, agent_id: &str, success: bool, quality: f64) {
        match self.trust.record_outcome(agent_id, success, quality) {
            Ok(update) => self.emit(TelemetryEvent::TrustUpdated {
                operation_id: operation_id.to_string(),
                update,
            }),
            Err(err) => warn!(event = "trust.update_failed", agent_id = %agent_id, error = %err),
        }
    }

    fn finish(
        &self,
        mut tracker: StateTracker,
        context: &ExecutionContext,
        decision: CeoDecision,
        mut errors: Vec<String>,
        outcome: Outcome,
        started: Instant,
    ) -> OperationResult {
        if let Err(err) = tracker.finish(outcome.terminal) {
            warn!(event = "operation.bad_transition", error = %err);
        }
        if let Some(failure) = &outcome.failure {
            errors.push(failure.to_string());
        }
        let execution_time_ms = if outcome.cache_hit {
            0
        } else {
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
        };

        let result = OperationResult {
            operation_id: tracker.operation_id().to_string(),
            task_id: context.task_id.clone(),
            success: outcome.failure.is_none(),
            output: outcome.output,
            cost: outcome.cost,
            execution_time_ms,
            attempts: outcome.attempts,
            cache_hit: outcome.cache_hit,
            final_state: tracker.state(),
            decisions_applied: vec![decision],
            errors,
            failure: outcome.failure,
            completed_at: Utc::now(),
        };

        self.lock_history().push(result.clone());
        self.emit(TelemetryEvent::OperationFinished {
            operation_id: result.operation_id.clone(),
            task_id: result.task_id.clone(),
            success: result.success,
            final_state: result.final_state,
            attempts: result.attempts,
            cost: result.cost,
            execution_time_ms: result.execution_time_ms,
            cache_hit: result.cache_hit,
        });
        result
    }

    fn report_decision(&self, operation_id: &str, context: &ExecutionContext, decision: &CeoDecision) {
        self.emit(TelemetryEvent::DecisionMade {
            operation_id: operation_id.to_string(),
            task_id: context.task_id.clone(),
            agent_id: decision
                .selected_agent
                .as_ref()
                .map(|agent| agent.agent_id.clone()),
            autonomy_level: decision.autonomy_level,
            should_proceed: decision.should_proceed,
        });
        for finding in &decision.policies {
            self.emit(TelemetryEvent::PolicyViolation {
                operation_id: operation_id.to_string(),
                policy_id: finding.policy_id.clone(),
                severity: finding.severity,
                message: finding.message.clone(),
            });
        }
    }

    fn advance(&self, tracker: &mut StateTracker, next: OperationState) {
        if let Err(err) = tracker.advance(next) {
            warn!(event = "operation.bad_transition", error = %err);
        }
    }

    fn emit(&self, event: TelemetryEvent) {
        obs::dispatch(self.sink.as_ref(), event);
    }

    fn lock_history(&self) -> MutexGuard<'_, OperationHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decision, enforcement, cost and approval gates, in that order.
///
/// `errors` collects notes for findings that are reported but tolerated.
fn gate<'d>(
    decision: &'d CeoDecision,
    context: &ExecutionContext,
    config: &AutonomyConfig,
    errors: &mut Vec<String>,
) -> Result<&'d SelectedAgent, OperationError> {
    let Some(selected) = decision.selected_agent.as_ref() else {
        return Err(OperationError::NoCapableAgent {
            reasoning: decision.reasoning.clone(),
        });
    };

    // Only a block or a critical finding stops a decision here.
    if !decision.should_proceed {
        return Err(policy_rejection(decision));
    }

    let level = config.policy_enforcement_level;
    for finding in &decision.policies {
        if level.aborts(finding.severity) {
            return Err(policy_rejection(decision));
        }
        match (finding.severity, level) {
            (PolicySeverity::Error, EnforcementLevel::Moderate) => {
                errors.push(format!("[ERROR] {}", finding.message));
            }
            (PolicySeverity::Error, _) => {
                warn!(event = "policy.tolerated", policy_id = %finding.policy_id, enforcement = %level);
            }
            _ => {}
        }
    }

    let cost_cap = context
        .cost_cap
        .map_or(config.cost_cap, |cap| cap.min(config.cost_cap));
    if selected.estimated_cost > cost_cap {
        return Err(OperationError::CostCapExceeded {
            estimated_cost: selected.estimated_cost,
            cost_cap,
        });
    }

    if decision.autonomy_level == AutonomyLevel::ApprovalRequired {
        return Err(OperationError::ApprovalRequired {
            reasoning: decision.reasoning.clone(),
        });
    }

    Ok(selected)
}

fn policy_rejection(decision: &CeoDecision) -> OperationError {
    OperationError::PolicyRejected {
        severity: decision
            .highest_severity()
            .unwrap_or(PolicySeverity::Error),
        reasoning: decision.reasoning.clone(),
        policies: decision.policies.clone(),
    }
}
