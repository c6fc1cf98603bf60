//! Concurrent capability registry.
//!
//! The id map sits behind an `RwLock`; each agent record has its own `Mutex`
//! so that outcome feedback for one agent never waits on another. Readers
//! copy records out and release every lock before returning.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::context::ExecutionContext;

use super::capability::{AgentCapability, AgentCategory};
use super::error::{RegistryError, RegistryResult};
use super::trust::OutcomeLog;

/// Registry entry: descriptor, eligibility flag and outcome log.
#[derive(Debug, Clone)]
pub(crate) struct AgentRecord {
    pub(crate) capability: AgentCapability,
    pub(crate) active: bool,
    pub(crate) outcomes: OutcomeLog,
}

impl AgentRecord {
    fn new(capability: AgentCapability) -> Self {
        Self {
            capability,
            active: true,
            outcomes: OutcomeLog::default(),
        }
    }
}

type AgentMap = BTreeMap<String, Arc<Mutex<AgentRecord>>>;

/// Holds every registered agent, keyed by id.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    agents: RwLock<AgentMap>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an agent.
    ///
    /// The capability is validated before any lock is taken, so a rejected
    /// registration leaves the registry untouched. Replacing an agent resets
    /// its outcome log and reactivates it.
    pub fn register_agent(&self, capability: AgentCapability) -> RegistryResult<()> {
        let capability = capability.normalized();
        capability.validate()?;

        let id = capability.id.clone();
        let category = capability.category;
        let replaced = self
            .write_agents()
            .insert(id.clone(), Arc::new(Mutex::new(AgentRecord::new(capability))))
            .is_some();

        info!(event = "agent.registered", agent_id = %id, category = %category, replaced);
        Ok(())
    }

    /// Exclude an agent from candidate lists without forgetting it.
    pub fn deactivate(&self, agent_id: &str) -> RegistryResult<()> {
        self.set_active(agent_id, false)
    }

    pub fn activate(&self, agent_id: &str) -> RegistryResult<()> {
        self.set_active(agent_id, true)
    }

    fn set_active(&self, agent_id: &str, active: bool) -> RegistryResult<()> {
        self.with_record(agent_id, |record| record.active = active)?;
        info!(event = "agent.activation_changed", agent_id = %agent_id, active);
        Ok(())
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentCapability> {
        self.with_record(agent_id, |record| record.capability.clone())
            .ok()
    }

    pub fn is_active(&self, agent_id: &str) -> Option<bool> {
        self.with_record(agent_id, |record| record.active).ok()
    }

    /// All agents, active or not, ordered by id.
    pub fn agents(&self) -> Vec<AgentCapability> {
        self.collect(|_| true)
    }

    pub fn agents_by_category(&self, category: AgentCategory) -> Vec<AgentCapability> {
        self.collect(|record| record.capability.category == category)
    }

    /// Active agents whose specializations intersect the context's required
    /// tags, ordered by id.
    pub fn list_candidates(&self, context: &ExecutionContext) -> Vec<AgentCapability> {
        let required = context.normalized_tags();
        if required.is_empty() {
            return Vec::new();
        }
        self.collect(|record| record.active && record.capability.matching_tags(&required) > 0)
    }

    pub fn len(&self) -> usize {
        self.read_agents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_agents().is_empty()
    }

    /// Run `f` against one agent's record under its lock.
    pub(crate) fn with_record<T>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut AgentRecord) -> T,
    ) -> RegistryResult<T> {
        let slot = self
            .read_agents()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownAgent(agent_id.to_string()))?;
        let mut record = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut *record))
    }

    fn collect(&self, keep: impl Fn(&AgentRecord) -> bool) -> Vec<AgentCapability> {
        let slots: Vec<Arc<Mutex<AgentRecord>>> = self.read_agents().values().cloned().collect();
        slots
            .iter()
            .filter_map(|slot| {
                let record = slot.lock().unwrap_or_else(PoisonError::into_inner);
                keep(&*record).then(|| record.capability.clone())
            })
            .collect()
    }

    fn read_agents(&self) -> RwLockReadGuard<'_, AgentMap> {
        self.agents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_agents(&self) -> RwLockWriteGuard<'_, AgentMap> {
        self.agents.write().unwrap_or_else(PoisonError::into_inner)
    }
}
