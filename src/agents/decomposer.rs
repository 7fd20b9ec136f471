use std::sync::Arc;
use uuid::Uuid;

use crate::agents::registry::AgentRegistry;
use crate::agents::types::{MultiAgentTask, Priority, SubTask};
use crate::{ConexusError, Result};

const SEQUENCING_CUES: &[&str] = &["first", "then", "next", "after", "before", "step by step"];
const UNION_CUES: &[&str] = &["and", "also", "both", "multiple", "compare", "various perspectives"];
const COMPREHENSIVE_CUES: &[&str] = &[
    "comprehensive",
    "complete",
    "full",
    "detailed",
    "system",
    "architecture",
    "overview",
];

const HIERARCHICAL_ASPECTS: &[&str] = &[
    "overview",
    "implementation",
    "dependencies",
    "performance",
    "security",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Sequential,
    Parallel,
    Hierarchical,
    Simple,
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Selects a decomposition strategy by scanning the query for cue-word
/// families (spec §4.8). Checked in priority order: sequential, then
/// parallel (requires at least two union-cue hits), then hierarchical.
fn select_strategy(query: &str) -> Strategy {
    let lower = query.to_lowercase();

    if SEQUENCING_CUES.iter().any(|cue| lower.contains(cue)) {
        return Strategy::Sequential;
    }

    let union_hits: usize = UNION_CUES.iter().map(|cue| count_occurrences(&lower, cue)).sum();
    if union_hits >= 2 {
        return Strategy::Parallel;
    }

    if COMPREHENSIVE_CUES.iter().any(|cue| lower.contains(cue)) {
        return Strategy::Hierarchical;
    }

    Strategy::Simple
}

/// Extracts capability keyword by scanning for known families (spec §4.8
/// step 1), defaulting to `code_analysis`.
fn extract_capability(query: &str) -> String {
    let lower = query.to_lowercase();
    if ["debug", "error"].iter().any(|k| lower.contains(k)) {
        "debugging".to_string()
    } else if ["security", "auth", "vulnerability"].iter().any(|k| lower.contains(k)) {
        "security".to_string()
    } else if ["design", "architecture", "system"].iter().any(|k| lower.contains(k)) {
        "architecture".to_string()
    } else if ["documentation", "explain", "how"].iter().any(|k| lower.contains(k)) {
        "documentation".to_string()
    } else {
        "code_analysis".to_string()
    }
}

fn split_sequential(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut cut_points: Vec<usize> = Vec::new();
    for cue in SEQUENCING_CUES {
        let mut start = 0;
        while let Some(pos) = lower[start..].find(cue) {
            let abs = start + pos;
            cut_points.push(abs);
            start = abs + cue.len();
        }
    }
    cut_points.sort_unstable();

    if cut_points.is_empty() {
        return vec![query.trim().to_string()];
    }

    let mut fragments = Vec::new();
    let mut prev = 0;
    for &cut in &cut_points {
        if cut > prev {
            let fragment = query[prev..cut].trim().trim_matches(',').trim();
            if !fragment.is_empty() {
                fragments.push(fragment.to_string());
            }
        }
        prev = cut;
    }
    let tail = query[prev..].trim().trim_matches(',').trim();
    if !tail.is_empty() {
        fragments.push(tail.to_string());
    }

    if fragments.is_empty() {
        vec![query.trim().to_string()]
    } else {
        fragments
    }
}

fn split_parallel(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut cut_points: Vec<usize> = Vec::new();
    for cue in UNION_CUES {
        let mut start = 0;
        while let Some(pos) = lower[start..].find(cue) {
            let abs = start + pos;
            cut_points.push(abs);
            start = abs + cue.len();
        }
    }
    cut_points.sort_unstable();

    let mut clauses = Vec::new();
    let mut prev = 0;
    for &cut in &cut_points {
        if cut > prev {
            let clause = query[prev..cut].trim().trim_matches(',').trim();
            if !clause.is_empty() {
                clauses.push(clause.to_string());
            }
        }
        prev = cut;
    }
    let tail = query[prev..].trim().trim_matches(',').trim();
    if !tail.is_empty() {
        clauses.push(tail.to_string());
    }

    if clauses.is_empty() {
        vec![query.trim().to_string()]
    } else {
        clauses
    }
}

fn hierarchical_fragments(query: &str) -> Vec<String> {
    HIERARCHICAL_ASPECTS
        .iter()
        .map(|aspect| format!("{query} — {aspect}"))
        .collect()
}

/// Produces subtask queries per the selected strategy (spec §4.8).
fn fragments_for(strategy: Strategy, query: &str) -> Vec<String> {
    match strategy {
        Strategy::Sequential => split_sequential(query),
        Strategy::Parallel => split_parallel(query),
        Strategy::Hierarchical => hierarchical_fragments(query),
        Strategy::Simple => vec![query.trim().to_string()],
    }
}

/// Decomposes a query into an agent-resolved subtask plan, selecting a
/// strategy and resolving each subtask to an available agent via the
/// Agent Registry (C8, spec §4.8).
pub struct TaskDecomposer {
    registry: Arc<AgentRegistry>,
}

impl TaskDecomposer {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub async fn decompose(&self, task: &MultiAgentTask) -> Result<Vec<SubTask>> {
        let strategy = select_strategy(&task.query);
        match self.try_build(strategy, task).await {
            Ok(subtasks) if !subtasks.is_empty() => Ok(subtasks),
            _ if strategy != Strategy::Simple => {
                // Fall back to Simple producing one best-effort subtask.
                self.try_build(Strategy::Simple, task).await
            }
            other => other,
        }
    }

    async fn try_build(&self, strategy: Strategy, task: &MultiAgentTask) -> Result<Vec<SubTask>> {
        let fragments = fragments_for(strategy, &task.query);
        let mut subtasks = Vec::with_capacity(fragments.len());
        let mut previous_id: Option<String> = None;

        for fragment in fragments {
            let capability = extract_capability(&fragment);
            let agent = self
                .registry
                .find_best_agent(&capability, &task.requirements)
                .await?;

            let mut timeout = task.priority.subtask_timeout();
            if let Some(hint) = task.requirements.get("subtask_timeout_secs") {
                if let Ok(secs) = hint.parse::<u64>() {
                    timeout = timeout.min(std::time::Duration::from_secs(secs));
                }
            }

            let dependencies = match (strategy, &previous_id) {
                (Strategy::Sequential, Some(prev)) => vec![prev.clone()],
                _ => Vec::new(),
            };

            let subtask_id = Uuid::new_v4().to_string();
            previous_id = Some(subtask_id.clone());

            subtasks.push(SubTask {
                id: subtask_id,
                task_id: task.id.clone(),
                agent_id: agent.id,
                capability,
                query: fragment,
                dependencies,
                timeout,
            });
        }

        Ok(subtasks)
    }
}
