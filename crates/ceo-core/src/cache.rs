//! Bounded FIFO cache of prior agent outputs.
//!
//! Entries are keyed by a SHA-256 signature of the request shape. Eviction is
//! strictly by insertion order: a `VecDeque` records keys as they are first
//! inserted and the oldest one is dropped when the cache is full. Reads never
//! reorder entries.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::context::ExecutionContext;
use crate::registry::AgentCategory;

pub const DEFAULT_CACHE_CAPACITY: usize = 1_000;

const FIELD_SEPARATOR: char = '\u{1f}';

/// The parts of a request that determine whether a prior output is reusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRequest {
    pub category: AgentCategory,
    pub task: String,
    #[serde(default)]
    pub constraints: BTreeMap<String, serde_json::Value>,
}

impl CacheRequest {
    pub fn new(category: AgentCategory, task: impl Into<String>) -> Self {
        Self {
            category,
            task: task.into(),
            constraints: BTreeMap::new(),
        }
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn from_context(category: AgentCategory, context: &ExecutionContext) -> Self {
        Self {
            category,
            task: context.task.clone(),
            constraints: context.constraints.clone(),
        }
    }
}

/// Hex-encoded SHA-256 signature of a [`CacheRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &CacheRequest) -> Self {
        let constraints = serde_json::Value::Object(
            request
                .constraints
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let mut hasher = Sha256::new();
        hasher.update(request.category.to_string().as_bytes());
        hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
        hasher.update(canonicalize_task(&request.task).as_bytes());
        hasher.update(FIELD_SEPARATOR.to_string().as_bytes());
        hasher.update(constraints.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim, lowercase and collapse internal whitespace.
pub fn canonicalize_task(task: &str) -> String {
    task.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A reusable output and what it cost to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedOutput {
    pub agent_id: String,
    pub output: serde_json::Value,
    pub cost: f64,
    pub quality: f64,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<CacheKey, CachedOutput>,
    order: VecDeque<CacheKey>,
}

#[derive(Debug)]
pub struct ExecutionCache {
    capacity: usize,
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for ExecutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ExecutionCache {
    /// A capacity of 0 disables storage; every lookup misses.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn key(&self, request: &CacheRequest) -> CacheKey {
        CacheKey::for_request(request)
    }

    pub fn get(&self, request: &CacheRequest) -> Option<CachedOutput> {
        let key = self.key(request);
        let found = self.lock().map.get(&key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `value`, evicting the oldest entry when full.
    ///
    /// Returns the evicted key, if any. Overwriting an existing key keeps its
    /// existing queue position.
    pub fn put(&self, request: &CacheRequest, value: CachedOutput) -> Option<CacheKey> {
        if self.capacity == 0 {
            return None;
        }
        let key = self.key(request);
        let mut entries = self.lock();

        if let Some(slot) = entries.map.get_mut(&key) {
            *slot = value;
            return None;
        }

        let evicted = if entries.order.len() >= self.capacity {
            let oldest = entries.order.pop_front();
            if let Some(oldest) = &oldest {
                entries.map.remove(oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            oldest
        } else {
            None
        };

        entries.order.push_back(key.clone());
        entries.map.insert(key, value);
        evicted
    }

    pub fn contains(&self, request: &CacheRequest) -> bool {
        let key = self.key(request);
        self.lock().map.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(agent: &str) -> CachedOutput {
        CachedOutput {
            agent_id: agent.to_string(),
            output: serde_json::json!({"text": agent}),
            cost: 5.0,
            quality: 90.0,
            cached_at: Utc::now(),
        }
    }

    fn request(task: &str) -> CacheRequest {
        CacheRequest::new(AgentCategory::Code, task)
    }

    #[test]
    fn test_canonical_task_collapses_whitespace() {
        assert_eq!(canonicalize_task("  Write   A\tParser \n"), "write a parser");
    }

    #[test]
    fn test_equivalent_requests_share_a_key() {
        let a = request("Write a parser").with_constraint("framework", "nom");
        let b = request("  write   a PARSER").with_constraint("framework", "nom");
        assert_eq!(CacheKey::for_request(&a), CacheKey::for_request(&b));
        assert_eq!(CacheKey::for_request(&a).as_str().len(), 64);
    }

    #[test]
    fn test_category_and_constraints_change_the_key() {
        let base = request("write a parser");
        let other_category = CacheRequest::new(AgentCategory::Content, "write a parser");
        let constrained = request("write a parser").with_constraint("framework", "pest");
        let key = CacheKey::for_request(&base);
        assert_ne!(key, CacheKey::for_request(&other_category));
        assert_ne!(key, CacheKey::for_request(&constrained));
    }

    #[test]
    fn test_get_counts_hits_and_misses() {
        let cache = ExecutionCache::new(4);
        assert!(cache.get(&request("a")).is_none());
        cache.put(&request("a"), output("x"));
        assert_eq!(cache.get(&request("a")).unwrap().agent_id, "x");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let cache = ExecutionCache::new(2);
        cache.put(&request("a"), output("1"));
        cache.put(&request("b"), output("2"));
        assert!(cache.put(&request("a"), output("3")).is_none());
        assert_eq!(cache.len(), 2);

        let evicted = cache.put(&request("c"), output("4"));
        assert_eq!(evicted, Some(CacheKey::for_request(&request("a"))));
        assert!(!cache.contains(&request("a")));
        assert!(cache.contains(&request("b")));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = ExecutionCache::new(0);
        cache.put(&request("a"), output("x"));
        assert!(cache.is_empty());
        assert!(cache.get(&request("a")).is_none());
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = ExecutionCache::new(3);
        cache.put(&request("a"), output("x"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains(&request("a")));
    }
}
