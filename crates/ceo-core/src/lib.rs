//! CEO Core Library
//!
//! Agent orchestration: a capability registry with trust feedback, a
//! deterministic decision engine, a FIFO execution cache and the autonomy
//! loop that ties them together behind the [`AgentAdapter`] seam.

pub mod adapter;
pub mod autonomy;
pub mod cache;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod registry;
pub mod telemetry;

pub use adapter::{AdapterError, AdapterResponse, AgentAdapter, AgentRequest, RoutingAdapter};

pub use autonomy::{AutonomyLoop, AutonomyStats, OperationResult, OperationState, RetryPolicy};

pub use cache::{CacheKey, CacheRequest, CacheStats, CachedOutput, ExecutionCache};

pub use config::{AutonomyConfig, BackoffStrategy, CacheConfig, OrchestratorSettings};

pub use context::{ExecutionContext, RiskTolerance};

pub use decision::{
    AutonomyLevel, AutonomyThresholds, CeoDecision, DecisionEngine, EnforcementLevel,
    EngineConfig, PolicyLimits, PolicySeverity, PolicyViolation, ScoringWeights, SelectedAgent,
};

pub use error::{ConfigError, ConfigResult, OperationError};

pub use metrics::{LoopMetrics, MetricsSnapshot};

pub use obs::{TelemetryEvent, TelemetrySink, TracingSink};

pub use telemetry::init_tracing;

pub use registry::{
    AgentCapability, AgentCategory, AgentMetrics, CapabilityRegistry, PerformanceTrend,
    RegistryError, RegistryResult, TrustConfig, TrustTracker, TrustUpdate,
};

/// Crate version, as recorded in Cargo metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
