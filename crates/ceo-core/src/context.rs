//! Per-request execution context.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::capability::normalize_tag;

/// How much autonomy the caller is willing to grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    /// Never run without a human approval step.
    Low,
    #[default]
    Medium,
    /// Doubles the auto-approve cost cap.
    High,
}

impl std::fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A task submitted to the autonomy loop.
///
/// Built once per request and shared by reference; nothing downstream
/// mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub task_id: String,
    /// Free-form task description forwarded to the agent.
    pub task: String,
    /// Specialization tags an agent must intersect to be a candidate.
    #[serde(default)]
    pub required_tags: BTreeSet<String>,
    /// Per-request ceiling on the estimated cost, combined with the loop cap.
    #[serde(default)]
    pub cost_cap: Option<f64>,
    /// Wall-clock limit for a single adapter attempt.
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    /// Minimum success rate (0..=100) the caller expects.
    #[serde(default)]
    pub required_quality: f64,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    /// Forces a blocked decision regardless of agent trust.
    #[serde(default)]
    pub require_oversight: bool,
    /// Request-shaping constraints (framework, style, length, ...).
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(task_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task: task.into(),
            required_tags: BTreeSet::new(),
            cost_cap: None,
            time_budget_ms: None,
            required_quality: 0.0,
            risk_tolerance: RiskTolerance::default(),
            require_oversight: false,
            constraints: BTreeMap::new(),
            user_id: None,
        }
    }

    /// Add required tags (trimmed, lowercased).
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_tags
            .extend(tags.into_iter().filter_map(|t| normalize_tag(t.as_ref())));
        self
    }

    pub fn with_cost_cap(mut self, cap: f64) -> Self {
        self.cost_cap = Some(cap);
        self
    }

    pub fn with_time_budget_ms(mut self, budget_ms: u64) -> Self {
        self.time_budget_ms = Some(budget_ms);
        self
    }

    pub fn with_required_quality(mut self, quality: f64) -> Self {
        self.required_quality = quality;
        self
    }

    pub fn with_risk_tolerance(mut self, tolerance: RiskTolerance) -> Self {
        self.risk_tolerance = tolerance;
        self
    }

    pub fn requiring_oversight(mut self) -> Self {
        self.require_oversight = true;
        self
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Required tags in canonical form, whatever path built the context.
    pub fn normalized_tags(&self) -> BTreeSet<String> {
        self.required_tags
            .iter()
            .filter_map(|t| normalize_tag(t))
            .collect()
    }

    /// Per-attempt adapter timeout, if the caller set one.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_ms.map(Duration::from_millis)
    }
}
