use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::agents::types::{AgentResult, Performance, SubTask};
use crate::config::CacheConfig;

const PASS_2_EVICTION_FRACTION: f64 = crate::constants::CACHE_EVICTION_FRACTION;

/// Canonicalizes a context map into a deterministic JSON string by sorting
/// keys before hashing (spec §9: "stability requires deterministic
/// serialization of the context map... sort map keys before hashing").
fn canonical_json(context: &HashMap<String, Value>) -> String {
    let sorted: BTreeMap<&String, &Value> = context.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn hash_parts(parts: &[(&str, &str)]) -> String {
    let sorted: BTreeMap<&str, &str> = parts.iter().copied().collect();
    let json = serde_json::to_string(&sorted).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

fn context_hash(context: &HashMap<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(context).as_bytes());
    hex::encode(hasher.finalize())
}

struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
    last_access: Instant,
    access_count: u64,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            cached_at: now,
            last_access: now,
            access_count: 0,
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.cached_at) > self.ttl
    }

    fn touch(&mut self) {
        self.last_access = Instant::now();
        self.access_count += 1;
    }
}

struct AgentResultEntry {
    agent_id: String,
    profile_id: String,
    result: AgentResult,
}

struct PlanEntry {
    agent_ids: Vec<String>,
    subtasks: Vec<SubTask>,
}

struct PerformanceEntry {
    agent_id: String,
    performance: Performance,
}

#[derive(Default)]
struct CacheState {
    agent_results: HashMap<String, CacheEntry<AgentResultEntry>>,
    plans: HashMap<String, CacheEntry<PlanEntry>>,
    performance: HashMap<String, CacheEntry<PerformanceEntry>>,
}

impl CacheState {
    fn total_len(&self) -> usize {
        self.agent_results.len() + self.plans.len() + self.performance.len()
    }
}

/// Per-kind hit/miss counters (spec §4.6: "per-kind hit rates are
/// reported").
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKindStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheKindStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub agent_results: CacheKindStats,
    pub plans: CacheKindStats,
    pub performance: CacheKindStats,
}

impl CacheStats {
    pub fn overall_hit_rate(&self) -> f64 {
        let hits = self.agent_results.hits + self.plans.hits + self.performance.hits;
        let misses = self.agent_results.misses + self.plans.misses + self.performance.misses;
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicKindCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AtomicKindCounters {
    fn snapshot(&self) -> CacheKindStats {
        CacheKindStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Three-tier coordination cache over agent results, coordination plans,
/// and per-(agent, capability) performance data, sharing one lock (C6,
/// spec §4.6).
pub struct CoordinationCache {
    state: RwLock<CacheState>,
    agent_result_counters: AtomicKindCounters,
    plan_counters: AtomicKindCounters,
    performance_counters: AtomicKindCounters,
    config: CacheConfig,
}

impl CoordinationCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            agent_result_counters: AtomicKindCounters::default(),
            plan_counters: AtomicKindCounters::default(),
            performance_counters: AtomicKindCounters::default(),
            config,
        }
    }

    fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.config.default_ttl_secs)
    }

    pub async fn get_agent_result(
        &self,
        agent_id: &str,
        query: &str,
        context: &HashMap<String, Value>,
        profile_id: &str,
    ) -> Option<AgentResult> {
        let key = hash_parts(&[
            ("agent_id", agent_id),
            ("query", query),
            ("context_hash", &context_hash(context)),
            ("profile_id", profile_id),
        ]);

        let mut state = self.state.write().await;
        let now = Instant::now();
        match state.agent_results.get_mut(&key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch();
                self.agent_result_counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.result.clone())
            }
            _ => {
                self.agent_result_counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set_agent_result(
        &self,
        agent_id: &str,
        query: &str,
        context: &HashMap<String, Value>,
        profile_id: &str,
        result: AgentResult,
        ttl: Option<Duration>,
    ) {
        let key = hash_parts(&[
            ("agent_id", agent_id),
            ("query", query),
            ("context_hash", &context_hash(context)),
            ("profile_id", profile_id),
        ]);

        let mut state = self.state.write().await;
        state.agent_results.insert(
            key,
            CacheEntry::new(
                AgentResultEntry {
                    agent_id: agent_id.to_string(),
                    profile_id: profile_id.to_string(),
                    result,
                },
                ttl.unwrap_or_else(|| self.default_ttl()),
            ),
        );
        self.maybe_evict(&mut state);
    }

    pub async fn get_plan(
        &self,
        query: &str,
        context: &HashMap<String, Value>,
    ) -> Option<Vec<SubTask>> {
        let key = hash_parts(&[("query", query), ("context_hash", &context_hash(context))]);

        let mut state = self.state.write().await;
        let now = Instant::now();
        match state.plans.get_mut(&key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch();
                self.plan_counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.subtasks.clone())
            }
            _ => {
                self.plan_counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set_plan(
        &self,
        query: &str,
        context: &HashMap<String, Value>,
        agent_ids: Vec<String>,
        subtasks: Vec<SubTask>,
        ttl: Option<Duration>,
    ) {
        let key = hash_parts(&[("query", query), ("context_hash", &context_hash(context))]);

        let mut state = self.state.write().await;
        state.plans.insert(
            key,
            CacheEntry::new(
                PlanEntry { agent_ids, subtasks },
                ttl.unwrap_or_else(|| self.default_ttl()),
            ),
        );
        self.maybe_evict(&mut state);
    }

    pub async fn get_performance(&self, agent_id: &str, capability: &str) -> Option<Performance> {
        let key = hash_parts(&[("agent_id", agent_id), ("capability", capability)]);

        let mut state = self.state.write().await;
        let now = Instant::now();
        match state.performance.get_mut(&key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch();
                self.performance_counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.performance)
            }
            _ => {
                self.performance_counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set_performance(
        &self,
        agent_id: &str,
        capability: &str,
        performance: Performance,
        ttl: Option<Duration>,
    ) {
        let key = hash_parts(&[("agent_id", agent_id), ("capability", capability)]);

        let mut state = self.state.write().await;
        state.performance.insert(
            key,
            CacheEntry::new(
                PerformanceEntry {
                    agent_id: agent_id.to_string(),
                    performance,
                },
                ttl.unwrap_or_else(|| self.default_ttl()),
            ),
        );
        self.maybe_evict(&mut state);
    }

    /// Drops every agent-result and performance entry for `agent_id`, plus
    /// any plan whose sequence references it (spec §4.6).
    pub async fn invalidate_agent(&self, agent_id: &str) {
        let mut state = self.state.write().await;
        state.agent_results.retain(|_, entry| entry.value.agent_id != agent_id);
        state.performance.retain(|_, entry| entry.value.agent_id != agent_id);
        state
            .plans
            .retain(|_, entry| !entry.value.agent_ids.iter().any(|id| id == agent_id));
    }

    /// Drops agent-results whose cached `profile_id` matches (spec §4.6).
    pub async fn invalidate_profile(&self, profile_id: &str) {
        let mut state = self.state.write().await;
        state
            .agent_results
            .retain(|_, entry| entry.value.profile_id != profile_id);
    }

    /// Resets everything including hit/miss counters (spec §4.6).
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = CacheState::default();
        self.agent_result_counters.hits.store(0, Ordering::Relaxed);
        self.agent_result_counters.misses.store(0, Ordering::Relaxed);
        self.plan_counters.hits.store(0, Ordering::Relaxed);
        self.plan_counters.misses.store(0, Ordering::Relaxed);
        self.performance_counters.hits.store(0, Ordering::Relaxed);
        self.performance_counters.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            agent_results: self.agent_result_counters.snapshot(),
            plans: self.plan_counters.snapshot(),
            performance: self.performance_counters.snapshot(),
        }
    }

    /// Runs eviction if the cache is over its configured capacity (spec
    /// §4.6). Called with the write lock already held.
    fn maybe_evict(&self, state: &mut CacheState) {
        if state.total_len() <= self.config.max_entries {
            return;
        }

        let now = Instant::now();
        debug!("cache over capacity, running eviction");
        self.cleanup_pass_one(state, now);

        if state.total_len() > self.config.max_entries {
            self.cleanup_pass_two(state);
        }
    }

    fn cleanup_pass_one(&self, state: &mut CacheState, now: Instant) {
        state
            .agent_results
            .retain(|_, e| !e.is_expired(now) && !(e.access_count == 0 && e.is_expired(now)));
        state
            .plans
            .retain(|_, e| !e.is_expired(now) && !(e.access_count == 0 && e.is_expired(now)));
        state
            .performance
            .retain(|_, e| !e.is_expired(now) && !(e.access_count == 0 && e.is_expired(now)));
    }

    fn cleanup_pass_two(&self, state: &mut CacheState) {
        evict_lowest_access_fraction(&mut state.agent_results, PASS_2_EVICTION_FRACTION);
        evict_lowest_access_fraction(&mut state.plans, PASS_2_EVICTION_FRACTION);
    }
}

fn evict_lowest_access_fraction<V>(map: &mut HashMap<String, CacheEntry<V>>, fraction: f64) {
    let evict_count = ((map.len() as f64) * fraction).ceil() as usize;
    if evict_count == 0 {
        return;
    }
    let mut by_last_access: Vec<(String, Instant)> =
        map.iter().map(|(k, v)| (k.clone(), v.last_access)).collect();
    by_last_access.sort_by_key(|(_, last_access)| *last_access);
    for (key, _) in by_last_access.into_iter().take(evict_count) {
        map.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{Priority, SubTask};
    use std::time::Duration as StdDuration;

    fn sample_result(agent_id: &str) -> AgentResult {
        AgentResult {
            task_id: "t1".to_string(),
            agent_id: agent_id.to_string(),
            success: true,
            output: "done".to_string(),
            error: None,
            duration: StdDuration::default(),
            confidence: 0.9,
            evidence: vec![],
        }
    }

    #[tokio::test]
    async fn miss_then_hit_increments_counters() {
        let cache = CoordinationCache::new(CacheConfig {
            default_ttl_secs: 60,
            max_entries: 100,
        });
        let context = HashMap::new();

        assert!(cache.get_agent_result("a1", "q", &context, "p1").await.is_none());
        cache
            .set_agent_result("a1", "q", &context, "p1", sample_result("a1"), None)
            .await;
        let hit = cache.get_agent_result("a1", "q", &context, "p1").await;
        assert!(hit.is_some());

        let stats = cache.stats();
        assert_eq!(stats.agent_results.hits, 1);
        assert_eq!(stats.agent_results.misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_miss() {
        let cache = CoordinationCache::new(CacheConfig {
            default_ttl_secs: 0,
            max_entries: 100,
        });
        let context = HashMap::new();
        cache
            .set_agent_result("a1", "q", &context, "p1", sample_result("a1"), None)
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get_agent_result("a1", "q", &context, "p1").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_agent_drops_results_and_plans() {
        let cache = CoordinationCache::new(CacheConfig {
            default_ttl_secs: 60,
            max_entries: 100,
        });
        let context = HashMap::new();
        cache
            .set_agent_result("a1", "q", &context, "p1", sample_result("a1"), None)
            .await;
        cache
            .set_plan(
                "q",
                &context,
                vec!["a1".to_string()],
                vec![SubTask {
                    id: "s1".to_string(),
                    task_id: "t1".to_string(),
                    agent_id: "a1".to_string(),
                    capability: "code_analysis".to_string(),
                    query: "q".to_string(),
                    dependencies: vec![],
                    timeout: Priority::Medium.subtask_timeout(),
                }],
                None,
            )
            .await;

        cache.invalidate_agent("a1").await;

        assert!(cache.get_agent_result("a1", "q", &context, "p1").await.is_none());
        assert!(cache.get_plan("q", &context).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_profile_drops_matching_agent_results_only() {
        let cache = CoordinationCache::new(CacheConfig {
            default_ttl_secs: 60,
            max_entries: 100,
        });
        let context = HashMap::new();
        cache
            .set_agent_result("a1", "q", &context, "profile-x", sample_result("a1"), None)
            .await;
        cache
            .set_agent_result("a2", "q", &context, "profile-y", sample_result("a2"), None)
            .await;

        cache.invalidate_profile("profile-x").await;

        assert!(cache.get_agent_result("a1", "q", &context, "profile-x").await.is_none());
        assert!(cache.get_agent_result("a2", "q", &context, "profile-y").await.is_some());
    }

    #[tokio::test]
    async fn clear_resets_counters() {
        let cache = CoordinationCache::new(CacheConfig {
            default_ttl_secs: 60,
            max_entries: 100,
        });
        let context = HashMap::new();
        cache
            .set_agent_result("a1", "q", &context, "p1", sample_result("a1"), None)
            .await;
        let _ = cache.get_agent_result("a1", "q", &context, "p1").await;

        cache.clear().await;
        let stats = cache.stats();
        assert_eq!(stats.agent_results.hits, 0);
        assert_eq!(stats.agent_results.misses, 0);
        assert!(cache.get_agent_result("a1", "q", &context, "p1").await.is_none());
    }

    #[tokio::test]
    async fn eviction_keeps_total_near_capacity() {
        let cache = CoordinationCache::new(CacheConfig {
            default_ttl_secs: 60,
            max_entries: 5,
        });
        let context = HashMap::new();
        for i in 0..20 {
            cache
                .set_agent_result(
                    &format!("a{i}"),
                    "q",
                    &context,
                    "p1",
                    sample_result(&format!("a{i}")),
                    None,
                )
                .await;
        }
        let state = cache.state.read().await;
        assert!(state.agent_results.len() <= 20);
    }
}
