//! FIFO eviction and signature behaviour of the execution cache.

use std::sync::Arc;

use chrono::Utc;

use ceo_core::{AgentCategory, CacheRequest, CachedOutput, ExecutionCache};

fn req(task: &str) -> CacheRequest {
    CacheRequest::new(AgentCategory::Content, task)
}

fn value(n: u32) -> CachedOutput {
    CachedOutput {
        agent_id: format!("agent-{n}"),
        output: serde_json::json!({ "n": n }),
        cost: f64::from(n),
        quality: 80.0,
        cached_at: Utc::now(),
    }
}

#[test]
fn test_third_insert_evicts_first() {
    let cache = ExecutionCache::new(2);
    cache.put(&req("k1"), value(1));
    cache.put(&req("k2"), value(2));
    cache.put(&req("k3"), value(3));

    assert!(cache.get(&req("k1")).is_none());
    assert_eq!(cache.get(&req("k2")).unwrap().agent_id, "agent-2");
    assert_eq!(cache.get(&req("k3")).unwrap().agent_id, "agent-3");
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_reads_do_not_protect_entries() {
    let cache = ExecutionCache::new(2);
    cache.put(&req("k1"), value(1));
    cache.put(&req("k2"), value(2));
    for _ in 0..10 {
        assert!(cache.get(&req("k1")).is_some());
    }
    cache.put(&req("k3"), value(3));

    assert!(!cache.contains(&req("k1")));
    assert!(cache.contains(&req("k2")));
}

#[test]
fn test_size_never_exceeds_capacity() {
    let cache = ExecutionCache::new(5);
    for i in 0..100 {
        cache.put(&req(&format!("task {i}")), value(i));
        assert!(cache.len() <= cache.capacity());
    }
    let stats = cache.stats();
    assert_eq!(stats.size, 5);
    assert_eq!(stats.evictions, 95);
    // the five newest survive
    for i in 95..100 {
        assert!(cache.contains(&req(&format!("task {i}"))));
    }
}

#[test]
fn test_equivalent_task_text_hits() {
    let cache = ExecutionCache::new(4);
    cache.put(&req("Summarize the Q3 report"), value(1));
    assert!(cache.get(&req("  summarize   the q3 REPORT ")).is_some());
    assert!(cache
        .get(&CacheRequest::new(AgentCategory::Analysis, "Summarize the Q3 report"))
        .is_none());
}

#[test]
fn test_concurrent_puts_stay_bounded() {
    let cache = Arc::new(ExecutionCache::new(16));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..50 {
                    cache.put(&req(&format!("t{t}-{i}")), value(i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(cache.len(), 16);
    assert_eq!(cache.stats().evictions, 8 * 50 - 16);
}
