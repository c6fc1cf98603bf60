//! Loop configuration and the TOML settings file.
//!
//! Every section is defaulted, so an empty file is a valid configuration:
//!
//! ```toml
//! [autonomy]
//! max_retries = 3
//! retry_delay_ms = 1000
//! policy_enforcement_level = "strict"
//!
//! [engine.thresholds]
//! auto_approve_cap = 100.0
//!
//! [[agents]]
//! id = "coder"
//! name = "Coder"
//! category = "code"
//! cost_per_call = 5.0
//! trust_score = 85.0
//! success_rate = 90.0
//! specializations = ["rust"]
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::decision::{EngineConfig, EnforcementLevel};
use crate::error::{ConfigError, ConfigResult};
use crate::registry::{AgentCapability, CapabilityRegistry, TrustConfig};

/// Delay growth between adapter attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Always `retry_delay_ms`.
    #[default]
    Fixed,
    /// `retry_delay_ms * 2^(attempt - 1)`.
    Exponential,
}

/// Runtime knobs of the autonomy loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Total adapter attempts per operation, including the first.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff: BackoffStrategy,
    pub learning_enabled: bool,
    pub policy_enforcement_level: EnforcementLevel,
    /// Loop-wide ceiling on the estimated cost of one operation.
    pub cost_cap: f64,
    pub history_capacity: usize,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            backoff: BackoffStrategy::Fixed,
            learning_enabled: true,
            policy_enforcement_level: EnforcementLevel::Strict,
            cost_cap: 10_000.0,
            history_capacity: 1_000,
        }
    }
}

impl AutonomyConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if !self.cost_cap.is_finite() || self.cost_cap < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cost_cap must be finite and >= 0, got {}",
                self.cost_cap
            )));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Everything an orchestrator process needs, as read from one TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub autonomy: AutonomyConfig,
    pub engine: EngineConfig,
    pub trust: TrustConfig,
    pub cache: CacheConfig,
    pub agents: Vec<AgentCapability>,
}

impl OrchestratorSettings {
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&raw)?;
        tracing::info!(
            event = "settings.loaded",
            path = %path.display(),
            agents = settings.agents.len(),
        );
        Ok(settings)
    }

    /// Validate every section, including each agent declaration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.autonomy.validate()?;
        self.engine.validate()?;
        self.trust.validate()?;
        for agent in &self.agents {
            agent.validate()?;
        }
        Ok(())
    }

    /// A fresh registry holding every declared agent.
    pub fn build_registry(&self) -> ConfigResult<Arc<CapabilityRegistry>> {
        let registry = Arc::new(CapabilityRegistry::new());
        for agent in &self.agents {
            registry.register_agent(agent.clone())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AutonomyConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay_ms, 1_000);
        assert!(cfg.learning_enabled);
        assert_eq!(cfg.policy_enforcement_level, EnforcementLevel::Strict);
        assert!((cfg.cost_cap - 10_000.0).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let cfg = AutonomyConfig {
            max_retries: 0,
            ..AutonomyConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_settings_are_default() {
        let settings = OrchestratorSettings::from_toml_str("").unwrap();
        assert_eq!(settings, OrchestratorSettings::default());
    }

    #[test]
    fn test_parse_sections_and_agents() {
        let raw = r#"
            [autonomy]
            max_retries = 5
            policy_enforcement_level = "moderate"
            backoff = "exponential"

            [cache]
            capacity = 10

            [[agents]]
            id = "coder"
            name = "Coder"
            category = "code"
            cost_per_call = 5.0
            trust_score = 85.0
            success_rate = 90.0
            specializations = ["Rust"]
        "#;
        let settings = OrchestratorSettings::from_toml_str(raw).unwrap();
        assert_eq!(settings.autonomy.max_retries, 5);
        assert_eq!(
            settings.autonomy.policy_enforcement_level,
            EnforcementLevel::Moderate
        );
        assert_eq!(settings.cache.capacity, 10);

        let registry = settings.build_registry().unwrap();
        assert!(registry.get("coder").unwrap().specializations.contains("rust"));
    }

    #[test]
    fn test_invalid_agent_rejected_on_load() {
        let raw = r#"
            [[agents]]
            id = "bad"
            name = "Bad"
            category = "code"
            cost_per_call = -1.0
            trust_score = 85.0
            success_rate = 90.0
        "#;
        match OrchestratorSettings::from_toml_str(raw) {
            Err(ConfigError::Registry(_)) => {}
            other => panic!("expected Registry error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            OrchestratorSettings::from_toml_str("[autonomy\nmax_retries = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
