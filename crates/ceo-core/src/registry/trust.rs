//! Outcome feedback: exponential moving averages over agent reliability.
//!
//! Every update is `new = old * (1 - α) + sample * α`, clamped to `0..=100`.
//! Failures use a larger α than successes so that a degrading agent is
//! demoted faster than an improving one is promoted.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::capability::AgentCapability;
use super::error::RegistryResult;
use super::store::CapabilityRegistry;

/// Learning rates for trust feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// α applied when an outcome succeeds.
    pub alpha_success: f64,
    /// α applied when an outcome fails. Must exceed `alpha_success`.
    pub alpha_failure: f64,
    /// Number of observed qualities kept per agent for metrics.
    pub history_window: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            alpha_success: 0.10,
            alpha_failure: 0.30,
            history_window: 100,
        }
    }
}

impl TrustConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |a: f64| a.is_finite() && a > 0.0 && a <= 1.0;
        if !in_unit(self.alpha_success) || !in_unit(self.alpha_failure) {
            return Err(ConfigError::Invalid(
                "trust alphas must be within (0, 1]".to_string(),
            ));
        }
        if self.alpha_failure <= self.alpha_success {
            return Err(ConfigError::Invalid(format!(
                "alpha_failure ({}) must be greater than alpha_success ({})",
                self.alpha_failure, self.alpha_success
            )));
        }
        if self.history_window == 0 {
            return Err(ConfigError::Invalid(
                "trust history_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Clamp a score into `0..=100`; non-finite input collapses to 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// One EMA step, clamped.
pub fn ema(old: f64, sample: f64, alpha: f64) -> f64 {
    clamp_score(old * (1.0 - alpha) + clamp_score(sample) * alpha)
}

/// Direction of recent observed quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Declining,
}

/// Rolling outcome log kept next to each registered agent.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutcomeLog {
    qualities: VecDeque<f64>,
    successes: u64,
    failures: u64,
}

impl OutcomeLog {
    fn push(&mut self, success: bool, quality: f64, window: usize) {
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.qualities.push_back(quality);
        while self.qualities.len() > window {
            self.qualities.pop_front();
        }
    }
}

/// Before/after view of a single trust update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub agent_id: String,
    pub success: bool,
    pub trust_before: f64,
    pub trust_after: f64,
    pub success_rate_before: f64,
    pub success_rate_after: f64,
}

/// Performance summary for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent: AgentCapability,
    pub active: bool,
    /// Mean observed quality over the history window, or the declared
    /// success rate when nothing has been observed yet.
    pub avg_quality: f64,
    pub execution_count: u64,
    pub successes: u64,
    pub failures: u64,
    pub trend: PerformanceTrend,
}

/// Applies outcome feedback to agents held in a [`CapabilityRegistry`].
#[derive(Debug, Clone)]
pub struct TrustTracker {
    registry: Arc<CapabilityRegistry>,
    config: TrustConfig,
}

impl TrustTracker {
    pub fn new(registry: Arc<CapabilityRegistry>, config: TrustConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Fold one outcome into the agent's trust score and success rate.
    ///
    /// Trust samples the observed quality on success and 0 on failure; the
    /// success rate samples 100 or 0. Updates to the same agent are
    /// serialized by the registry's per-agent lock.
    pub fn record_outcome(
        &self,
        agent_id: &str,
        success: bool,
        observed_quality: f64,
    ) -> RegistryResult<TrustUpdate> {
        let alpha = if success {
            self.config.alpha_success
        } else {
            self.config.alpha_failure
        };
        let quality = clamp_score(observed_quality);
        let (trust_sample, rate_sample) = if success { (quality, 100.0) } else { (0.0, 0.0) };
        let window = self.config.history_window;

        let update = self.registry.with_record(agent_id, |record| {
            let cap = &mut record.capability;
            let trust_before = cap.trust_score;
            let success_rate_before = cap.success_rate;

            cap.trust_score = ema(trust_before, trust_sample, alpha);
            cap.success_rate = ema(success_rate_before, rate_sample, alpha);
            record.outcomes.push(success, quality, window);

            TrustUpdate {
                agent_id: agent_id.to_string(),
                success,
                trust_before,
                trust_after: cap.trust_score,
                success_rate_before,
                success_rate_after: cap.success_rate,
            }
        })?;

        tracing::debug!(
            agent_id = %agent_id,
            success,
            trust_after = update.trust_after,
            success_rate_after = update.success_rate_after,
            "trust updated"
        );
        Ok(update)
    }

    /// Aggregate performance view for one agent.
    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.registry
            .with_record(agent_id, |record| {
                let log = &record.outcomes;
                let avg_quality = if log.qualities.is_empty() {
                    record.capability.success_rate
                } else {
                    log.qualities.iter().sum::<f64>() / log.qualities.len() as f64
                };
                AgentMetrics {
                    agent: record.capability.clone(),
                    active: record.active,
                    avg_quality,
                    execution_count: log.successes + log.failures,
                    successes: log.successes,
                    failures: log.failures,
                    trend: calculate_trend(&log.qualities),
                }
            })
            .ok()
    }
}

/// Compare the last 10 qualities with the 10 before them.
///
/// Fewer than 3 samples, or no older window, reads as stable; a mean shift of
/// more than 5 points either way is a trend.
pub fn calculate_trend(history: &VecDeque<f64>) -> PerformanceTrend {
    let len = history.len();
    if len < 3 {
        return PerformanceTrend::Stable;
    }

    let recent_start = len.saturating_sub(10);
    let older_start = len.saturating_sub(20);
    let older: Vec<f64> = history.range(older_start..recent_start).copied().collect();
    if older.is_empty() {
        return PerformanceTrend::Stable;
    }
    let recent: Vec<f64> = history.range(recent_start..).copied().collect();

    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let difference = mean(&recent) - mean(&older);
    if difference > 5.0 {
        PerformanceTrend::Improving
    } else if difference < -5.0 {
        PerformanceTrend::Declining
    } else {
        PerformanceTrend::Stable
    }
}
