//! Agent capability descriptors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::{RegistryError, RegistryResult};

/// Broad family of work an agent performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCategory {
    Code,
    Content,
    Data,
    Analysis,
    Automation,
    Reasoning,
}

impl std::fmt::Display for AgentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Content => write!(f, "content"),
            Self::Data => write!(f, "data"),
            Self::Analysis => write!(f, "analysis"),
            Self::Automation => write!(f, "automation"),
            Self::Reasoning => write!(f, "reasoning"),
        }
    }
}

/// Descriptor of a callable agent.
///
/// Scores are percentages in `0..=100`; `cost_per_call` is expressed in the
/// billing unit of the deployment (cents in the hosted product).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub id: String,
    pub name: String,
    pub category: AgentCategory,
    #[serde(default)]
    pub description: String,
    pub cost_per_call: f64,
    pub trust_score: f64,
    pub success_rate: f64,
    #[serde(default)]
    pub max_context_tokens: u32,
    #[serde(default)]
    pub specializations: BTreeSet<String>,
}

impl AgentCapability {
    /// A free agent with neutral scores and no specializations.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: AgentCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            description: String::new(),
            cost_per_call: 0.0,
            trust_score: 50.0,
            success_rate: 50.0,
            max_context_tokens: 8_192,
            specializations: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_cost(mut self, cost_per_call: f64) -> Self {
        self.cost_per_call = cost_per_call;
        self
    }

    pub fn with_scores(mut self, trust_score: f64, success_rate: f64) -> Self {
        self.trust_score = trust_score;
        self.success_rate = success_rate;
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: u32) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Add specialization tags. Tags are trimmed and lowercased.
    pub fn with_specializations<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.specializations
            .extend(tags.into_iter().filter_map(|t| normalize_tag(t.as_ref())));
        self
    }

    /// Check the registration invariants without touching any registry.
    pub fn validate(&self) -> RegistryResult<()> {
        let reject = |reason: &str| RegistryError::InvalidCapability {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(reject("id must not be empty"));
        }
        if !self.cost_per_call.is_finite() || self.cost_per_call < 0.0 {
            return Err(reject("cost_per_call must be a finite value >= 0"));
        }
        if !is_percentage(self.trust_score) {
            return Err(reject("trust_score must be within 0..=100"));
        }
        if !is_percentage(self.success_rate) {
            return Err(reject("success_rate must be within 0..=100"));
        }
        Ok(())
    }

    /// Canonical form stored by the registry: tags normalized, empties dropped.
    pub(crate) fn normalized(mut self) -> Self {
        self.specializations = std::mem::take(&mut self.specializations)
            .iter()
            .filter_map(|t| normalize_tag(t))
            .collect();
        self
    }

    /// Number of `required` tags this agent covers.
    pub fn matching_tags(&self, required: &BTreeSet<String>) -> usize {
        required
            .iter()
            .filter(|t| self.specializations.contains(t.as_str()))
            .count()
    }
}

/// Lowercase and trim a tag; `None` for blank input.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_lowercase())
    }
}

fn is_percentage(value: f64) -> bool {
    value.is_finite() && (0.0..=100.0).contains(&value)
}
