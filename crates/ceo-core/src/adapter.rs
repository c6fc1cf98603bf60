//! Seam between the autonomy loop and whatever actually runs an agent.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::AgentCategory;

/// What an adapter receives for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub operation_id: String,
    pub task_id: String,
    pub task: String,
    pub category: AgentCategory,
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
    /// 1-based attempt number.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub output: serde_json::Value,
    /// Quality the agent achieved, 0..=100. Feeds trust updates.
    pub observed_quality: f64,
    /// Actual cost billed for the call.
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("transient agent failure: {0}")]
    Transient(String),

    #[error("agent call timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("no adapter route for agent {0}")]
    Unroutable(String),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Executes one attempt against one agent.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn execute(&self, agent_id: &str, request: &AgentRequest) -> AdapterResult<AdapterResponse>;
}

/// Dispatches to a per-agent adapter, with an optional fallback.
#[derive(Default, Clone)]
pub struct RoutingAdapter {
    routes: HashMap<String, Arc<dyn AgentAdapter>>,
    fallback: Option<Arc<dyn AgentAdapter>>,
}

impl std::fmt::Debug for RoutingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<&String> = self.routes.keys().collect();
        routes.sort();
        f.debug_struct("RoutingAdapter")
            .field("routes", &routes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl RoutingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, agent_id: impl Into<String>, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.routes.insert(agent_id.into(), adapter);
        self
    }

    pub fn with_fallback(mut self, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.fallback = Some(adapter);
        self
    }

    fn route(&self, agent_id: &str) -> Option<&Arc<dyn AgentAdapter>> {
        self.routes.get(agent_id).or(self.fallback.as_ref())
    }
}

#[async_trait]
impl AgentAdapter for RoutingAdapter {
    async fn execute(&self, agent_id: &str, request: &AgentRequest) -> AdapterResult<AdapterResponse> {
        let adapter = self
            .route(agent_id)
            .ok_or_else(|| AdapterError::Unroutable(agent_id.to_string()))?;
        adapter.execute(agent_id, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl AgentAdapter for Fixed {
        async fn execute(&self, _agent_id: &str, _request: &AgentRequest) -> AdapterResult<AdapterResponse> {
            Ok(AdapterResponse {
                output: serde_json::json!(self.0),
                observed_quality: 80.0,
                cost: 1.0,
            })
        }
    }

    fn request() -> AgentRequest {
        AgentRequest {
            operation_id: "op-1".into(),
            task_id: "t-1".into(),
            task: "x".into(),
            category: AgentCategory::Code,
            constraints: BTreeMap::new(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_routes_by_agent_id() {
        let router = RoutingAdapter::new()
            .with_route("a", Arc::new(Fixed("from-a")))
            .with_fallback(Arc::new(Fixed("fallback")));

        let a = router.execute("a", &request()).await.unwrap();
        assert_eq!(a.output, serde_json::json!("from-a"));
        let other = router.execute("zzz", &request()).await.unwrap();
        assert_eq!(other.output, serde_json::json!("fallback"));
    }

    #[tokio::test]
    async fn test_unroutable_without_fallback() {
        let router = RoutingAdapter::new().with_route("a", Arc::new(Fixed("a")));
        match router.execute("b", &request()).await {
            Err(AdapterError::Unroutable(id)) => assert_eq!(id, "b"),
            other => panic!("expected Unroutable, got {:?}", other),
        }
    }
}
