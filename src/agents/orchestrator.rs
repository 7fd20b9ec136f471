use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock, Semaphore};
use tracing::{debug, warn};

use crate::agents::decomposer::TaskDecomposer;
use crate::agents::registry::AgentRegistry;
use crate::agents::types::{Agent, AgentResult, AgentStatus, MultiAgentTask, SubTask};
use crate::config::OrchestratorConfig;
use crate::Result;

/// Abstracts the actual act of invoking an agent with a subtask. Wiring a
/// concrete agent runtime behind this trait is out of scope here; the
/// orchestrator only needs the contract.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, agent: &Agent, subtask: &SubTask) -> Result<AgentResult>;
}

/// One subtask's result paired with the subtask that produced it, so
/// downstream synthesis (C10) knows which capability/profile each result
/// speaks to.
#[derive(Debug, Clone)]
pub struct SubtaskOutcome {
    pub subtask: SubTask,
    pub result: AgentResult,
}

/// Outcome of one `Execute` call (spec §4.9 step 6).
#[derive(Debug, Clone)]
pub struct OrchestrationOutcome {
    pub results: Vec<SubtaskOutcome>,
    pub timed_out: bool,
}

/// Restores an agent to `available` when dropped, regardless of whether
/// the owning task completed, failed, or was cancelled by a deadline.
/// `Drop` cannot await, so the restore runs as a detached task.
struct AvailabilityGuard {
    registry: Arc<AgentRegistry>,
    agent_id: String,
}

impl Drop for AvailabilityGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let agent_id = self.agent_id.clone();
        tokio::spawn(async move {
            let _ = registry.update_status(&agent_id, AgentStatus::Available).await;
        });
    }
}

fn failed_result(task_id: &str, agent_id: &str, message: String) -> AgentResult {
    AgentResult {
        task_id: task_id.to_string(),
        agent_id: agent_id.to_string(),
        success: false,
        output: String::new(),
        error: Some(message),
        duration: Duration::default(),
        confidence: 0.0,
        evidence: Vec::new(),
    }
}

/// Executes a decomposed subtask plan under concurrency and deadline
/// limits, tracking agent availability and dependency ordering (C9,
/// spec §4.9).
pub struct MultiAgentOrchestrator {
    decomposer: Arc<TaskDecomposer>,
    registry: Arc<AgentRegistry>,
    invoker: Arc<dyn AgentInvoker>,
    config: OrchestratorConfig,
}

impl MultiAgentOrchestrator {
    pub fn new(
        decomposer: Arc<TaskDecomposer>,
        registry: Arc<AgentRegistry>,
        invoker: Arc<dyn AgentInvoker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            decomposer,
            registry,
            invoker,
            config,
        }
    }

    pub async fn execute(&self, task: MultiAgentTask) -> Result<OrchestrationOutcome> {
        let subtasks = self.decomposer.decompose(&task).await?;
        let subtask_by_id: HashMap<String, SubTask> =
            subtasks.iter().map(|s| (s.id.clone(), s.clone())).collect();
        let deadline = self.config.deadline();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let results: Arc<RwLock<HashMap<String, AgentResult>>> = Arc::new(RwLock::new(HashMap::new()));
        let notify = Arc::new(Notify::new());

        let mut join_set = tokio::task::JoinSet::new();
        for subtask in subtasks {
            let semaphore = semaphore.clone();
            let results = results.clone();
            let notify = notify.clone();
            let registry = self.registry.clone();
            let invoker = self.invoker.clone();
            let task_id = task.id.clone();

            join_set.spawn(async move {
                wait_for_dependencies(&subtask, &results, &notify).await;

                let _permit = semaphore.acquire().await.expect("semaphore never closed");

                let agent = match registry.get(&subtask.agent_id).await {
                    Some(agent) => agent,
                    None => {
                        let result = failed_result(
                            &task_id,
                            &subtask.agent_id,
                            format!("agent {} not found", subtask.agent_id),
                        );
                        record_and_notify(&results, &notify, &subtask.id, result.clone()).await;
                        return SubtaskOutcome { subtask, result };
                    }
                };

                if agent.status != AgentStatus::Available {
                    let result = failed_result(
                        &task_id,
                        &subtask.agent_id,
                        format!("agent {} is not available", subtask.agent_id),
                    );
                    record_and_notify(&results, &notify, &subtask.id, result.clone()).await;
                    return SubtaskOutcome { subtask, result };
                }

                if registry
                    .update_status(&subtask.agent_id, AgentStatus::Busy)
                    .await
                    .is_err()
                {
                    let result = failed_result(
                        &task_id,
                        &subtask.agent_id,
                        format!("agent {} disappeared before dispatch", subtask.agent_id),
                    );
                    record_and_notify(&results, &notify, &subtask.id, result.clone()).await;
                    return SubtaskOutcome { subtask, result };
                }
                let _availability_guard = AvailabilityGuard {
                    registry: registry.clone(),
                    agent_id: subtask.agent_id.clone(),
                };

                let started = Instant::now();
                let invoked = tokio::time::timeout(subtask.timeout, invoker.invoke(&agent, &subtask)).await;
                let result = match invoked {
                    Ok(Ok(mut result)) => {
                        result.duration = started.elapsed();
                        result
                    }
                    Ok(Err(e)) => {
                        warn!(subtask_id = %subtask.id, error = %e, "subtask invocation failed");
                        let mut result = failed_result(&task_id, &subtask.agent_id, e.user_message());
                        result.duration = started.elapsed();
                        result
                    }
                    Err(_elapsed) => {
                        warn!(subtask_id = %subtask.id, "subtask timed out");
                        let mut result = failed_result(
                            &task_id,
                            &subtask.agent_id,
                            "subtask timed out".to_string(),
                        );
                        result.duration = started.elapsed();
                        result
                    }
                };

                record_and_notify(&results, &notify, &subtask.id, result.clone()).await;
                SubtaskOutcome { subtask, result }
            });
        }

        let collected = tokio::time::timeout(deadline, drain(&mut join_set)).await;

        match collected {
            Ok(collected) => Ok(OrchestrationOutcome {
                results: collected,
                timed_out: false,
            }),
            Err(_) => {
                join_set.abort_all();
                let finished = results.read().await;
                let partial: Vec<SubtaskOutcome> = finished
                    .iter()
                    .filter_map(|(id, result)| {
                        subtask_by_id.get(id).map(|subtask| SubtaskOutcome {
                            subtask: subtask.clone(),
                            result: result.clone(),
                        })
                    })
                    .collect();
                debug!(count = partial.len(), "orchestrator deadline fired, returning partial results");
                Ok(OrchestrationOutcome {
                    results: partial,
                    timed_out: true,
                })
            }
        }
    }
}

async fn wait_for_dependencies(
    subtask: &SubTask,
    results: &Arc<RwLock<HashMap<String, AgentResult>>>,
    notify: &Arc<Notify>,
) {
    if subtask.dependencies.is_empty() {
        return;
    }
    loop {
        let satisfied = {
            let guard = results.read().await;
            subtask.dependencies.iter().all(|dep| guard.contains_key(dep))
        };
        if satisfied {
            return;
        }
        notify.notified().await;
    }
}

async fn record_and_notify(
    results: &Arc<RwLock<HashMap<String, AgentResult>>>,
    notify: &Arc<Notify>,
    subtask_id: &str,
    result: AgentResult,
) {
    results.write().await.insert(subtask_id.to_string(), result);
    notify.notify_waiters();
}

async fn drain(join_set: &mut tokio::task::JoinSet<SubtaskOutcome>) -> Vec<SubtaskOutcome> {
    let mut collected = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => collected.push(outcome),
            Err(join_err) => warn!(error = %join_err, "subtask execution task panicked"),
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{Capability, CapabilityCategory, Priority};
    use crate::config::AgentRegistryConfig;
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubInvoker {
        delay: Duration,
        fail_agents: Vec<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentInvoker for StubInvoker {
        async fn invoke(&self, agent: &Agent, subtask: &SubTask) -> Result<AgentResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail_agents.contains(&agent.id) {
                return Ok(AgentResult {
                    task_id: subtask.task_id.clone(),
                    agent_id: agent.id.clone(),
                    success: false,
                    output: String::new(),
                    error: Some("simulated failure".to_string()),
                    duration: Duration::default(),
                    confidence: 0.0,
                    evidence: vec![],
                });
            }
            Ok(AgentResult {
                task_id: subtask.task_id.clone(),
                agent_id: agent.id.clone(),
                success: true,
                output: format!("handled: {}", subtask.query),
                error: None,
                duration: Duration::default(),
                confidence: 0.9,
                evidence: vec![],
            })
        }
    }

    async fn agent_registry_with(ids: &[&str]) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new(AgentRegistryConfig {
            health_interval_secs: 60,
        }));
        for id in ids {
            registry
                .register(Agent {
                    id: id.to_string(),
                    name: id.to_string(),
                    agent_type: "generic".to_string(),
                    capabilities: vec![Capability {
                        id: "code_analysis".to_string(),
                        category: CapabilityCategory::Analysis,
                        skills: vec![],
                        performance: None,
                    }],
                    profile: "default".to_string(),
                    status: AgentStatus::Available,
                    registered_at: Utc::now(),
                    last_seen: Utc::now(),
                    metadata: HashMap::new(),
                })
                .await
                .unwrap();
        }
        registry
    }

    fn task(query: &str) -> MultiAgentTask {
        MultiAgentTask {
            id: "t1".to_string(),
            query: query.to_string(),
            profile: "code_analysis".to_string(),
            context: HashMap::<String, Value>::new(),
            requirements: HashMap::new(),
            priority: Priority::Medium,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn simple_task_produces_one_result_and_restores_availability() {
        let registry = agent_registry_with(&["agent-code_analysis"]).await;
        let decomposer = Arc::new(TaskDecomposer::new(registry.clone()));
        let invoker = Arc::new(StubInvoker {
            delay: Duration::from_millis(1),
            fail_agents: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let orchestrator = MultiAgentOrchestrator::new(
            decomposer,
            registry.clone(),
            invoker,
            OrchestratorConfig {
                deadline_secs: 5,
                max_concurrency: 5,
            },
        );

        let outcome = orchestrator.execute(task("explain this module")).await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].result.success);
        assert!(!outcome.timed_out);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let agent = registry.get("agent-code_analysis").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Available);
    }

    #[tokio::test]
    async fn subtask_failure_does_not_abort_siblings() {
        let registry = agent_registry_with(&["agent-debugging"]).await;
        let decomposer = Arc::new(TaskDecomposer::new(registry.clone()));
        let invoker = Arc::new(StubInvoker {
            delay: Duration::from_millis(1),
            fail_agents: vec!["agent-debugging".to_string()],
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let orchestrator = MultiAgentOrchestrator::new(
            decomposer,
            registry,
            invoker,
            OrchestratorConfig {
                deadline_secs: 5,
                max_concurrency: 5,
            },
        );

        let outcome = orchestrator.execute(task("debug this error")).await.unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].result.success);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn sequential_subtasks_dispatch_in_dependency_order() {
        let registry = agent_registry_with(&[
            "agent-code_analysis",
            "agent-debugging",
            "agent-security",
            "agent-architecture",
            "agent-documentation",
        ])
        .await;
        let decomposer = Arc::new(TaskDecomposer::new(registry.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let invoker = Arc::new(StubInvoker {
            delay: Duration::from_millis(5),
            fail_agents: vec![],
            calls: calls.clone(),
        });
        let orchestrator = MultiAgentOrchestrator::new(
            decomposer,
            registry,
            invoker,
            OrchestratorConfig {
                deadline_secs: 5,
                max_concurrency: 5,
            },
        );

        let outcome = orchestrator
            .execute(task("first find the login handler, then analyze its error handling"))
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn global_deadline_returns_partial_results() {
        let registry = agent_registry_with(&["agent-code_analysis"]).await;
        let decomposer = Arc::new(TaskDecomposer::new(registry.clone()));
        let invoker = Arc::new(StubInvoker {
            delay: Duration::from_secs(5),
            fail_agents: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let orchestrator = MultiAgentOrchestrator::new(
            decomposer,
            registry,
            invoker,
            OrchestratorConfig {
                deadline_secs: 0,
                max_concurrency: 5,
            },
        );

        let outcome = orchestrator.execute(task("explain this module")).await.unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.results.is_empty());
    }
}
