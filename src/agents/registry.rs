use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agents::types::{Agent, AgentStatus, Performance};
use crate::config::AgentRegistryConfig;
use crate::{ConexusError, Result};

/// Accumulates rolling performance observations for one (agent,
/// capability) pair. Modeled on the incremental-average pattern used for
/// agent task completions elsewhere in this codebase, generalized to
/// success rate, latency, error rate, load/capacity, and throughput
/// (spec's supplemented agent-performance-rollup behavior).
#[derive(Debug, Clone)]
struct PerformanceAccumulator {
    completions: u64,
    successes: u64,
    errors: u64,
    avg_latency_seconds: f64,
    throughput: f64,
}

impl Default for PerformanceAccumulator {
    fn default() -> Self {
        Self {
            completions: 0,
            successes: 0,
            errors: 0,
            avg_latency_seconds: 0.0,
            throughput: 0.0,
        }
    }
}

impl PerformanceAccumulator {
    fn record(&mut self, success: bool, latency: Duration) {
        let n = self.completions as f64;
        self.avg_latency_seconds =
            (self.avg_latency_seconds * n + latency.as_secs_f64()) / (n + 1.0);
        self.completions += 1;
        if success {
            self.successes += 1;
        } else {
            self.errors += 1;
        }
        // throughput: completions per minute of observed activity, a cheap
        // proxy in absence of a real time-windowed counter.
        self.throughput = self.completions as f64 / ((self.avg_latency_seconds.max(0.001)) / 60.0).max(1.0);
    }

    fn to_performance(&self, load: f64, capacity: f64) -> Performance {
        let success_rate = if self.completions == 0 {
            100.0
        } else {
            (self.successes as f64 / self.completions as f64) * 100.0
        };
        let error_rate = if self.completions == 0 {
            0.0
        } else {
            self.errors as f64 / self.completions as f64
        };
        Performance {
            success_rate,
            avg_latency_seconds: self.avg_latency_seconds,
            error_rate,
            load,
            capacity,
            throughput: self.throughput,
        }
    }
}

/// Tracks agent identity, capabilities, health, and rolling performance
/// (C7, spec §4.7).
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Agent>>,
    performance: RwLock<HashMap<(String, String), PerformanceAccumulator>>,
    config: AgentRegistryConfig,
}

impl AgentRegistry {
    pub fn new(config: AgentRegistryConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            performance: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn register(&self, agent: Agent) -> Result<()> {
        debug!(agent_id = %agent.id, "registering agent");
        self.agents.write().await.insert(agent.id.clone(), agent);
        Ok(())
    }

    pub async fn unregister(&self, id: &str) {
        self.agents.write().await.remove(id);
    }

    pub async fn get(&self, id: &str) -> Option<Agent> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.agents.write().await.clear();
        self.performance.write().await.clear();
    }

    /// Always refreshes `last_seen`, per spec §4.7: "`UpdateAgentStatus`
    /// always refreshes `LastSeen`."
    pub async fn update_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| ConexusError::NotFound(format!("agent {id} not found")))?;
        agent.status = status;
        agent.last_seen = Utc::now();
        Ok(())
    }

    pub async fn record_completion(
        &self,
        agent_id: &str,
        capability_id: &str,
        success: bool,
        latency: Duration,
    ) {
        let mut performance = self.performance.write().await;
        performance
            .entry((agent_id.to_string(), capability_id.to_string()))
            .or_default()
            .record(success, latency);
    }

    async fn performance_for(&self, agent_id: &str, capability_id: &str, load: f64, capacity: f64) -> Performance {
        let performance = self.performance.read().await;
        performance
            .get(&(agent_id.to_string(), capability_id.to_string()))
            .map(|acc| acc.to_performance(load, capacity))
            .unwrap_or_default()
    }

    /// `FindBestAgent` scoring (spec §4.7). Candidates are agents that
    /// declare `capability_id` among their capabilities and are currently
    /// `available`. Returns the highest-scoring candidate; fails with
    /// `NoSuitableAgent` if none qualify.
    pub async fn find_best_agent(
        &self,
        capability_id: &str,
        requirements: &HashMap<String, String>,
    ) -> Result<Agent> {
        let agents = self.agents.read().await.clone();
        let mut best: Option<(Agent, f64)> = None;

        for agent in agents.into_values() {
            if agent.status != AgentStatus::Available {
                continue;
            }
            let Some(capability) = agent.capabilities.iter().find(|c| c.id == capability_id) else {
                continue;
            };

            let perf = match &capability.performance {
                Some(p) => *p,
                None => {
                    self.performance_for(&agent.id, capability_id, 0.0, 1.0)
                        .await
                }
            };

            let score = score_agent(&perf, requirements, &agent.metadata);

            match &best {
                Some((_, best_score)) if *best_score >= score => {}
                _ => best = Some((agent, score)),
            }
        }

        best.map(|(agent, _)| agent).ok_or_else(|| ConexusError::NoSuitableAgent {
            capability: capability_id.to_string(),
        })
    }

    /// Marks any agent whose `last_seen` is older than 2x the configured
    /// health interval as `unavailable` (spec §4.7). The wall-clock `now`
    /// is snapshotted once before acquiring the lock (spec §9: avoid
    /// reading `now` inside the lock).
    pub async fn run_health_scan(&self) -> Vec<String> {
        let now = Utc::now();
        let stale_after = chrono::Duration::seconds(self.config.health_interval_secs as i64 * 2);

        let mut agents = self.agents.write().await;
        let mut changed = Vec::new();
        for agent in agents.values_mut() {
            if agent.status == AgentStatus::Unavailable {
                continue;
            }
            if now - agent.last_seen > stale_after {
                agent.status = AgentStatus::Unavailable;
                changed.push(agent.id.clone());
            }
        }
        if !changed.is_empty() {
            warn!(agents = ?changed, "health scan marked agents unavailable");
        }
        changed
    }

    /// Spawns the background health-scan loop (supplemented behavior,
    /// modeled on the teacher's periodic cleanup-loop shape).
    pub fn spawn_health_scan_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_secs = self.config.health_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let changed = self.run_health_scan().await;
                if !changed.is_empty() {
                    info!(count = changed.len(), "health scan swept stale agents");
                }
            }
        })
    }
}

fn score_agent(
    perf: &Performance,
    requirements: &HashMap<String, String>,
    metadata: &HashMap<String, String>,
) -> f64 {
    let mut score = perf.success_rate;
    score += (100.0 / (1.0 + perf.avg_latency_seconds)) * 0.2;
    score += (perf.throughput / 10.0).min(20.0);
    score -= perf.error_rate * 50.0;

    if perf.capacity > 0.0 {
        let ratio = perf.load / perf.capacity;
        if ratio > 0.8 {
            score -= (ratio - 0.8) * 100.0;
        }
    }

    for (key, value) in requirements {
        match metadata.get(key) {
            Some(actual) if actual == value => {}
            _ => score -= 10.0,
        }
    }

    score.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{Capability, CapabilityCategory};
    use chrono::Utc;

    fn agent(id: &str, status: AgentStatus, capability_id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            name: id.to_string(),
            agent_type: "generic".to_string(),
            capabilities: vec![Capability {
                id: capability_id.to_string(),
                category: CapabilityCategory::Analysis,
                skills: vec![],
                performance: None,
            }],
            profile: "default".to_string(),
            status,
            registered_at: Utc::now(),
            last_seen: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn find_best_agent_fails_with_no_candidates() {
        let registry = AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 60,
        });
        let result = registry.find_best_agent("security", &HashMap::new()).await;
        assert!(matches!(result, Err(ConexusError::NoSuitableAgent { .. })));
    }

    #[tokio::test]
    async fn find_best_agent_skips_unavailable() {
        let registry = AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 60,
        });
        registry
            .register(agent("a1", AgentStatus::Busy, "security"))
            .await
            .unwrap();
        let result = registry.find_best_agent("security", &HashMap::new()).await;
        assert!(matches!(result, Err(ConexusError::NoSuitableAgent { .. })));
    }

    #[tokio::test]
    async fn find_best_agent_prefers_better_performance() {
        let registry = AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 60,
        });
        registry
            .register(agent("slow", AgentStatus::Available, "security"))
            .await
            .unwrap();
        registry
            .register(agent("fast", AgentStatus::Available, "security"))
            .await
            .unwrap();

        registry
            .record_completion("slow", "security", true, Duration::from_secs(5))
            .await;
        for _ in 0..5 {
            registry
                .record_completion("fast", "security", true, Duration::from_millis(100))
                .await;
        }

        let best = registry
            .find_best_agent("security", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(best.id, "fast");
    }

    #[tokio::test]
    async fn requirement_mismatch_penalizes_score() {
        let registry = AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 60,
        });
        let mut matching = agent("match", AgentStatus::Available, "security");
        matching.metadata.insert("region".to_string(), "us".to_string());
        let mismatching = agent("mismatch", AgentStatus::Available, "security");

        registry.register(matching).await.unwrap();
        registry.register(mismatching).await.unwrap();

        let mut requirements = HashMap::new();
        requirements.insert("region".to_string(), "us".to_string());

        let best = registry
            .find_best_agent("security", &requirements)
            .await
            .unwrap();
        assert_eq!(best.id, "match");
    }

    #[tokio::test]
    async fn update_status_refreshes_last_seen() {
        let registry = AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 60,
        });
        let mut a = agent("a1", AgentStatus::Available, "security");
        a.last_seen = Utc::now() - chrono::Duration::hours(1);
        let old_seen = a.last_seen;
        registry.register(a).await.unwrap();

        registry.update_status("a1", AgentStatus::Busy).await.unwrap();
        let updated = registry.get("a1").await.unwrap();
        assert!(updated.last_seen > old_seen);
        assert_eq!(updated.status, AgentStatus::Busy);
    }

    #[tokio::test]
    async fn health_scan_marks_stale_agents_unavailable() {
        let registry = AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 1,
        });
        let mut stale = agent("stale", AgentStatus::Available, "security");
        stale.last_seen = Utc::now() - chrono::Duration::seconds(10);
        registry.register(stale).await.unwrap();

        let changed = registry.run_health_scan().await;
        assert_eq!(changed, vec!["stale".to_string()]);

        let updated = registry.get("stale").await.unwrap();
        assert_eq!(updated.status, AgentStatus::Unavailable);
    }
}
