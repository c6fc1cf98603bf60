//! Capability registry and trust feedback.
//!
//! # Module layout
//!
//! - [`capability`]: `AgentCapability`, `AgentCategory`
//! - [`store`]: `CapabilityRegistry` (upsert, activation, candidate listing)
//! - [`trust`]: `TrustTracker`, `TrustConfig`, EMA helpers, `AgentMetrics`
//! - [`error`]: `RegistryError`, `RegistryResult`

pub mod capability;
pub mod error;
pub mod store;
pub mod trust;

pub use capability::{AgentCapability, AgentCategory};
pub use error::{RegistryError, RegistryResult};
pub use store::CapabilityRegistry;
pub use trust::{AgentMetrics, PerformanceTrend, TrustConfig, TrustTracker, TrustUpdate};
