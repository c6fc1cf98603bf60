//! Built-in decision policies and their enforcement levels.

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::ConfigError;
use crate::registry::AgentCapability;

pub const REQUIRED_CONTEXT: &str = "required_context";
pub const TIME_CONSTRAINT: &str = "time_constraint";
pub const QUALITY_REQUIREMENT: &str = "quality_requirement";
pub const COST_CEILING: &str = "cost_ceiling";
pub const LOW_TRUST_AGENT: &str = "low_trust_agent";
pub const SPECIALIZATION_FALLBACK: &str = "specialization_fallback";
pub const AUTONOMY_BLOCKED: &str = "autonomy_blocked";

/// Severity of a policy finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySeverity {
    /// Recorded, never blocks.
    Warning,
    /// Blocks only under strict enforcement.
    Error,
    /// Always blocks.
    Critical,
}

impl PolicySeverity {
    /// Upper-case label used in reasoning text.
    pub fn label(self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for PolicySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A rule breach found while evaluating a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy_id: String,
    pub severity: PolicySeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_resolution: Option<String>,
}

impl PolicyViolation {
    pub fn new(policy_id: &str, severity: PolicySeverity, message: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            severity,
            message: message.into(),
            suggested_resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.suggested_resolution = Some(resolution.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == PolicySeverity::Critical
    }
}

/// Highest severity present, if any.
pub fn highest_severity(policies: &[PolicyViolation]) -> Option<PolicySeverity> {
    policies.iter().map(|p| p.severity).max()
}

/// How strictly the autonomy loop acts on policy findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Errors and criticals abort.
    #[default]
    Strict,
    /// Criticals abort; errors are noted on the result.
    Moderate,
    /// Criticals abort; errors are only logged.
    Lenient,
}

impl EnforcementLevel {
    /// Whether a finding of `severity` aborts the operation at this level.
    pub fn aborts(self, severity: PolicySeverity) -> bool {
        match severity {
            PolicySeverity::Critical => true,
            PolicySeverity::Error => self == Self::Strict,
            PolicySeverity::Warning => false,
        }
    }
}

impl std::fmt::Display for EnforcementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Moderate => write!(f, "moderate"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

/// Thresholds for the built-in policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyLimits {
    /// Estimated cost above this is an error.
    pub soft_cost_cap: f64,
    /// Estimated cost above this is critical.
    pub hard_cost_cap: f64,
    /// Selecting an agent below this trust is a warning.
    pub trust_warning_threshold: f64,
    /// Time budgets below this are a warning.
    pub min_time_budget_ms: u64,
    /// Required quality above this is a warning.
    pub max_realistic_quality: f64,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            soft_cost_cap: 1_000.0,
            hard_cost_cap: 10_000.0,
            trust_warning_threshold: 70.0,
            min_time_budget_ms: 5_000,
            max_realistic_quality: 95.0,
        }
    }
}

impl PolicyLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.soft_cost_cap) || !non_negative(self.hard_cost_cap) {
            return Err(ConfigError::Invalid(
                "policy cost caps must be finite and >= 0".to_string(),
            ));
        }
        if self.soft_cost_cap > self.hard_cost_cap {
            return Err(ConfigError::Invalid(format!(
                "soft_cost_cap ({}) must not exceed hard_cost_cap ({})",
                self.soft_cost_cap, self.hard_cost_cap
            )));
        }
        Ok(())
    }
}

/// Findings about the request itself, independent of any agent.
pub fn evaluate_context(context: &ExecutionContext, limits: &PolicyLimits) -> Vec<PolicyViolation> {
    let mut findings = Vec::new();

    let mut missing = Vec::new();
    if context.task_id.trim().is_empty() {
        missing.push("task_id");
    }
    if context.task.trim().is_empty() {
        missing.push("task");
    }
    if !missing.is_empty() {
        findings.push(
            PolicyViolation::new(
                REQUIRED_CONTEXT,
                PolicySeverity::Critical,
                format!("missing required context field(s): {}", missing.join(", ")),
            )
            .with_resolution("Provide a task id and a non-empty task description"),
        );
    }

    if let Some(budget) = context.time_budget_ms {
        if budget < limits.min_time_budget_ms {
            findings.push(
                PolicyViolation::new(
                    TIME_CONSTRAINT,
                    PolicySeverity::Warning,
                    format!("time budget {budget}ms is very tight"),
                )
                .with_resolution("Consider increasing the time budget for better results"),
            );
        }
    }

    if context.required_quality > limits.max_realistic_quality {
        findings.push(
            PolicyViolation::new(
                QUALITY_REQUIREMENT,
                PolicySeverity::Warning,
                format!(
                    "required quality {:.0}% is very high",
                    context.required_quality
                ),
            )
            .with_resolution("Consider relaxing the quality requirement slightly"),
        );
    }

    findings
}

/// Findings about the selected agent.
///
/// `covered` is the number of required tags the agent covers out of
/// `required`.
pub fn evaluate_selection(
    context: &ExecutionContext,
    agent: &AgentCapability,
    covered: usize,
    required: usize,
    limits: &PolicyLimits,
) -> Vec<PolicyViolation> {
    let mut findings = Vec::new();
    let cost = agent.cost_per_call;

    if cost > limits.hard_cost_cap {
        findings.push(
            PolicyViolation::new(
                COST_CEILING,
                PolicySeverity::Critical,
                format!(
                    "estimated cost {cost:.2} exceeds hard cap {:.2}",
                    limits.hard_cost_cap
                ),
            )
            .with_resolution("Register a cheaper agent or split the task"),
        );
    } else if cost > limits.soft_cost_cap {
        findings.push(
            PolicyViolation::new(
                COST_CEILING,
                PolicySeverity::Error,
                format!(
                    "estimated cost {cost:.2} exceeds soft cap {:.2}",
                    limits.soft_cost_cap
                ),
            )
            .with_resolution("Raise the soft cap or request a lower-cost operation"),
        );
    }

    if agent.trust_score < limits.trust_warning_threshold {
        findings.push(PolicyViolation::new(
            LOW_TRUST_AGENT,
            PolicySeverity::Warning,
            format!(
                "selected agent {} has low trust {:.1}",
                agent.id, agent.trust_score
            ),
        ));
    }

    if covered < required {
        findings.push(
            PolicyViolation::new(
                SPECIALIZATION_FALLBACK,
                PolicySeverity::Warning,
                format!(
                    "agent {} covers {covered}/{required} required specializations",
                    agent.id
                ),
            )
            .with_resolution("Register an agent covering every required tag"),
        );
    }

    if agent.success_rate < context.required_quality {
        findings.push(PolicyViolation::new(
            QUALITY_REQUIREMENT,
            PolicySeverity::Warning,
            format!(
                "agent {} success rate {:.1}% is below required {:.1}%",
                agent.id, agent.success_rate, context.required_quality
            ),
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AgentCategory;

    fn agent(cost: f64, trust: f64) -> AgentCapability {
        AgentCapability::new("a1", "A1", AgentCategory::Code)
            .with_cost(cost)
            .with_scores(trust, 90.0)
            .with_specializations(["rust"])
    }

    #[test]
    fn test_severity_ordering() {
        assert!(PolicySeverity::Warning < PolicySeverity::Error);
        assert!(PolicySeverity::Error < PolicySeverity::Critical);
    }

    #[test]
    fn test_enforcement_matrix() {
        for level in [
            EnforcementLevel::Strict,
            EnforcementLevel::Moderate,
            EnforcementLevel::Lenient,
        ] {
            assert!(level.aborts(PolicySeverity::Critical), "{level}");
            assert!(!level.aborts(PolicySeverity::Warning), "{level}");
        }
        assert!(EnforcementLevel::Strict.aborts(PolicySeverity::Error));
        assert!(!EnforcementLevel::Moderate.aborts(PolicySeverity::Error));
        assert!(!EnforcementLevel::Lenient.aborts(PolicySeverity::Error));
    }

    #[test]
    fn test_blank_task_is_critical() {
        let ctx = ExecutionContext::new("t-1", "   ");
        let findings = evaluate_context(&ctx, &PolicyLimits::default());
        assert_eq!(findings.len(), 1);
        assert!(findings[0].is_critical());
        assert!(findings[0].message.contains("task"));
    }

    #[test]
    fn test_tight_budget_and_high_quality_warn() {
        let ctx = ExecutionContext::new("t-1", "write")
            .with_time_budget_ms(1_000)
            .with_required_quality(99.0);
        let findings = evaluate_context(&ctx, &PolicyLimits::default());
        let ids: Vec<&str> = findings.iter().map(|f| f.policy_id.as_str()).collect();
        assert_eq!(ids, vec![TIME_CONSTRAINT, QUALITY_REQUIREMENT]);
        assert_eq!(highest_severity(&findings), Some(PolicySeverity::Warning));
    }

    #[test]
    fn test_cost_ceiling_severity_by_cap() {
        let ctx = ExecutionContext::new("t", "x");
        let limits = PolicyLimits::default();

        let soft = evaluate_selection(&ctx, &agent(1_500.0, 90.0), 1, 1, &limits);
        assert_eq!(highest_severity(&soft), Some(PolicySeverity::Error));

        let hard = evaluate_selection(&ctx, &agent(20_000.0, 90.0), 1, 1, &limits);
        assert_eq!(highest_severity(&hard), Some(PolicySeverity::Critical));

        let fine = evaluate_selection(&ctx, &agent(10.0, 90.0), 1, 1, &limits);
        assert!(fine.is_empty());
    }

    #[test]
    fn test_low_trust_and_partial_coverage_warn() {
        let ctx = ExecutionContext::new("t", "x");
        let findings =
            evaluate_selection(&ctx, &agent(10.0, 60.0), 1, 2, &PolicyLimits::default());
        let ids: Vec<&str> = findings.iter().map(|f| f.policy_id.as_str()).collect();
        assert_eq!(ids, vec![LOW_TRUST_AGENT, SPECIALIZATION_FALLBACK]);
    }

    #[test]
    fn test_limits_reject_inverted_caps() {
        let limits = PolicyLimits {
            soft_cost_cap: 500.0,
            hard_cost_cap: 100.0,
            ..PolicyLimits::default()
        };
        assert!(limits.validate().is_err());
    }
}
