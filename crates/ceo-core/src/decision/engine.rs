//! Agent selection and autonomy classification.
//!
//! [`decide`] is a pure function of a candidate list, a context and an
//! [`EngineConfig`]; [`DecisionEngine`] only adds the registry read. Nothing
//! here records timestamps or generates ids, so equal inputs produce equal
//! decisions.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{ExecutionContext, RiskTolerance};
use crate::error::ConfigError;
use crate::registry::{AgentCapability, AgentCategory, CapabilityRegistry};

use super::policy::{
    self, highest_severity, PolicyLimits, PolicySeverity, PolicyViolation, AUTONOMY_BLOCKED,
};

/// How much human oversight a decision needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Autonomous,
    ApprovalRequired,
    Blocked,
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Autonomous => write!(f, "autonomous"),
            Self::ApprovalRequired => write!(f, "approval_required"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Snapshot of the winning candidate at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedAgent {
    pub agent_id: String,
    pub category: AgentCategory,
    pub estimated_cost: f64,
    /// The agent's success rate when selected.
    pub expected_quality: f64,
    pub score: f64,
    pub reason: String,
}

/// Outcome of evaluating one context against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeoDecision {
    pub selected_agent: Option<SelectedAgent>,
    pub autonomy_level: AutonomyLevel,
    pub should_proceed: bool,
    pub reasoning: String,
    pub policies: Vec<PolicyViolation>,
}

impl CeoDecision {
    pub fn highest_severity(&self) -> Option<PolicySeverity> {
        highest_severity(&self.policies)
    }

    pub fn has_critical(&self) -> bool {
        self.policies.iter().any(PolicyViolation::is_critical)
    }

    /// Estimated cost of the selected agent, 0 when nothing was selected.
    pub fn estimated_cost(&self) -> f64 {
        self.selected_agent
            .as_ref()
            .map_or(0.0, |agent| agent.estimated_cost)
    }
}

/// Linear scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub trust: f64,
    pub success: f64,
    pub cost: f64,
    /// Bonus per unit of required-tag coverage (0..=1).
    pub fit_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            trust: 0.5,
            success: 0.3,
            cost: 0.2,
            fit_bonus: 10.0,
        }
    }
}

/// Trust and cost thresholds for autonomy classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyThresholds {
    pub high_trust: f64,
    pub low_trust: f64,
    pub auto_approve_cap: f64,
}

impl Default for AutonomyThresholds {
    fn default() -> Self {
        Self {
            high_trust: 80.0,
            low_trust: 50.0,
            auto_approve_cap: 100.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: ScoringWeights,
    pub thresholds: AutonomyThresholds,
    pub limits: PolicyLimits,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.weights;
        for (name, value) in [
            ("weights.trust", w.trust),
            ("weights.success", w.success),
            ("weights.cost", w.cost),
            ("weights.fit_bonus", w.fit_bonus),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }

        let t = &self.thresholds;
        if !(0.0..=100.0).contains(&t.low_trust) || !(0.0..=100.0).contains(&t.high_trust) {
            return Err(ConfigError::Invalid(
                "trust thresholds must be within 0..=100".to_string(),
            ));
        }
        if t.low_trust > t.high_trust {
            return Err(ConfigError::Invalid(format!(
                "low_trust ({}) must not exceed high_trust ({})",
                t.low_trust, t.high_trust
            )));
        }
        if !t.auto_approve_cap.is_finite() || t.auto_approve_cap < 0.0 {
            return Err(ConfigError::Invalid(
                "auto_approve_cap must be finite and >= 0".to_string(),
            ));
        }

        self.limits.validate()
    }
}

/// Reads the registry and delegates to [`decide`].
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    registry: Arc<CapabilityRegistry>,
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(registry: Arc<CapabilityRegistry>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn make_decision(&self, context: &ExecutionContext) -> CeoDecision {
        let candidates = self.registry.list_candidates(context);
        decide(&candidates, context, &self.config)
    }
}

/// A scored candidate.
#[derive(Debug, Clone)]
struct Scored<'a> {
    agent: &'a AgentCapability,
    covered: usize,
    score: f64,
}

/// Select an agent from `candidates` and classify the decision.
pub fn decide(
    candidates: &[AgentCapability],
    context: &ExecutionContext,
    config: &EngineConfig,
) -> CeoDecision {
    let mut policies = policy::evaluate_context(context, &config.limits);
    let required = context.normalized_tags();

    let best = candidates
        .iter()
        .map(|agent| {
            let covered = agent.matching_tags(&required);
            Scored {
                agent,
                covered,
                score: score_candidate(agent, covered, required.len(), candidates, &config.weights),
            }
        })
        .max_by(compare_scored);

    let Some(best) = best else {
        let reasoning = if required.is_empty() {
            "no capable agent: the task declares no required specializations".to_string()
        } else {
            format!(
                "no capable agent: no active agent covers any of [{}]",
                required.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        };
        return CeoDecision {
            selected_agent: None,
            autonomy_level: AutonomyLevel::Blocked,
            should_proceed: false,
            reasoning: with_findings(reasoning, &policies),
            policies,
        };
    };

    let agent = best.agent;
    policies.extend(policy::evaluate_selection(
        context,
        agent,
        best.covered,
        required.len(),
        &config.limits,
    ));

    let (autonomy_level, block_reason) = classify_autonomy(agent, context, &config.thresholds);
    if let Some(reason) = block_reason {
        policies.push(
            PolicyViolation::new(AUTONOMY_BLOCKED, PolicySeverity::Error, reason)
                .with_resolution("Route the task through a human reviewer"),
        );
    }

    let has_critical = policies.iter().any(PolicyViolation::is_critical);
    let should_proceed = autonomy_level != AutonomyLevel::Blocked && !has_critical;

    let reason = format!(
        "covers {}/{} required tags, trust {:.1}, success {:.1}%, cost {:.2}",
        best.covered,
        required.len(),
        agent.trust_score,
        agent.success_rate,
        agent.cost_per_call
    );
    let reasoning = with_findings(
        format!(
            "selected {} ({}) with score {:.2}: {}; autonomy {}",
            agent.id, agent.category, best.score, reason, autonomy_level
        ),
        &policies,
    );

    CeoDecision {
        selected_agent: Some(SelectedAgent {
            agent_id: agent.id.clone(),
            category: agent.category,
            estimated_cost: agent.cost_per_call,
            expected_quality: agent.success_rate,
            score: best.score,
            reason,
        }),
        autonomy_level,
        should_proceed,
        reasoning,
        policies,
    }
}

/// Weighted score of one candidate relative to the rest of the pool.
pub fn score_candidate(
    agent: &AgentCapability,
    covered: usize,
    required: usize,
    pool: &[AgentCapability],
    weights: &ScoringWeights,
) -> f64 {
    let max_cost = pool
        .iter()
        .map(|a| a.cost_per_call)
        .fold(0.0_f64, f64::max);
    let normalized_cost = if max_cost > 0.0 {
        100.0 * agent.cost_per_call / max_cost
    } else {
        0.0
    };
    let coverage = if required == 0 {
        0.0
    } else {
        covered as f64 / required as f64
    };

    weights.trust * agent.trust_score + weights.success * agent.success_rate
        - weights.cost * normalized_cost
        + weights.fit_bonus * coverage
}

/// Higher score wins; ties go to the cheaper agent, then the smaller id.
fn compare_scored(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| b.agent.cost_per_call.total_cmp(&a.agent.cost_per_call))
        .then_with(|| b.agent.id.cmp(&a.agent.id))
}

/// Autonomy level for `agent`, plus the block explanation when blocked.
pub fn classify_autonomy(
    agent: &AgentCapability,
    context: &ExecutionContext,
    thresholds: &AutonomyThresholds,
) -> (AutonomyLevel, Option<String>) {
    if context.require_oversight {
        return (
            AutonomyLevel::Blocked,
            Some("task requires human oversight".to_string()),
        );
    }
    if agent.trust_score < thresholds.low_trust {
        return (
            AutonomyLevel::Blocked,
            Some(format!(
                "agent {} trust {:.1} is below the autonomy floor {:.1}",
                agent.id, agent.trust_score, thresholds.low_trust
            )),
        );
    }

    let cap = match context.risk_tolerance {
        RiskTolerance::High => thresholds.auto_approve_cap * 2.0,
        _ => thresholds.auto_approve_cap,
    };
    let autonomous = context.risk_tolerance != RiskTolerance::Low
        && agent.trust_score >= thresholds.high_trust
        && agent.cost_per_call <= cap;

    if autonomous {
        (AutonomyLevel::Autonomous, None)
    } else {
        (AutonomyLevel::ApprovalRequired, None)
    }
}

fn with_findings(mut reasoning: String, policies: &[PolicyViolation]) -> String {
    for finding in policies {
        reasoning.push_str(&format!(
            "; [{}] {}: {}",
            finding.severity.label(),
            finding.policy_id,
            finding.message
        ));
    }
    reasoning
}
