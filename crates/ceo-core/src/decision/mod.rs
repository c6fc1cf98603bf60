//! Decision engine: agent selection, autonomy classification, policy findings.

pub mod engine;
pub mod policy;

pub use engine::{
    classify_autonomy, decide, score_candidate, AutonomyLevel, AutonomyThresholds, CeoDecision,
    DecisionEngine, EngineConfig, ScoringWeights, SelectedAgent,
};
pub use policy::{
    highest_severity, EnforcementLevel, PolicyLimits, PolicySeverity, PolicyViolation,
};
