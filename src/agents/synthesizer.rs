use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::agents::orchestrator::SubtaskOutcome;
use crate::agents::types::{Conflict, ConflictType, Evidence, Resolution, ResolutionType, Severity};

const CONSENSUS_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Final, weighted summary produced by the synthesizer (spec §4.10).
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub summary: String,
    pub confidence: f64,
    pub conflicts: Vec<Conflict>,
    pub resolutions: Vec<Resolution>,
}

/// Fixed profile/capability adjacency table (spec §4.10).
fn related_profiles(profile: &str) -> &'static [&'static str] {
    match profile {
        "code_analysis" => &["debugging", "security"],
        "documentation" => &["architecture"],
        "debugging" => &["code_analysis", "security"],
        "architecture" => &["documentation", "code_analysis"],
        "security" => &["code_analysis", "debugging"],
        _ => &[],
    }
}

fn profile_relevance(task_profile: &str, subtask_capability: &str) -> f64 {
    if task_profile == subtask_capability {
        1.2
    } else if related_profiles(task_profile).contains(&subtask_capability) {
        1.0
    } else {
        0.8
    }
}

fn evidence_weight(evidence: &[Evidence]) -> f64 {
    if evidence.is_empty() {
        return 0.8;
    }
    let sum: f64 = evidence.iter().map(|e| e.evidence_type.weight() * e.confidence).sum();
    (sum / evidence.len() as f64).clamp(0.5, 1.5)
}

/// Pairs whose presence on opposite sides of two outputs is a direct
/// contradiction (spec §4.10).
const CONTRADICTION_PAIRS: &[(&str, &str)] = &[
    ("yes", "no"),
    ("true", "false"),
    ("works", "broken"),
    ("secure", "vulnerable"),
    ("fast", "slow"),
];

/// Weaker opposing-concept pairs that accumulate partial contradiction
/// evidence rather than an outright hit (spec §4.10).
const OPPOSING_CONCEPT_PAIRS: &[(&str, &str)] = &[
    ("safe", "risky"),
    ("stable", "unstable"),
    ("recommended", "discouraged"),
    ("pass", "fail"),
    ("valid", "invalid"),
];

fn normalize(text: &str) -> String {
    text.to_lowercase()
}

fn contradiction_score(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);

    for (left, right) in CONTRADICTION_PAIRS {
        let crossed = (norm_a.contains(left) && norm_b.contains(right))
            || (norm_a.contains(right) && norm_b.contains(left));
        if crossed {
            return 1.0;
        }
    }

    let mut score = 0.0;
    for (left, right) in OPPOSING_CONCEPT_PAIRS {
        let crossed = (norm_a.contains(left) && norm_b.contains(right))
            || (norm_a.contains(right) && norm_b.contains(left));
        if crossed {
            score += 0.3;
        }
    }
    score.min(1.0)
}

fn jaccard_dissimilarity(a: &str, b: &str) -> f64 {
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        0.0
    } else {
        1.0 - (intersection as f64 / union as f64)
    }
}

fn severity_for(score: f64) -> Severity {
    if score > 0.8 {
        Severity::Critical
    } else if score > 0.6 {
        Severity::High
    } else if score > 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Produces a weighted synthesis and detects pairwise conflicts across
/// successful agent results (C10, spec §4.10).
pub struct ResultSynthesizer {
    consensus_threshold: f64,
    fallback_opinions: HashMap<String, String>,
}

impl Default for ResultSynthesizer {
    fn default() -> Self {
        Self::new(CONSENSUS_CONFIDENCE_THRESHOLD, HashMap::new())
    }
}

impl ResultSynthesizer {
    pub fn new(consensus_threshold: f64, fallback_opinions: HashMap<String, String>) -> Self {
        Self {
            consensus_threshold,
            fallback_opinions,
        }
    }

    pub fn synthesize(&self, task_profile: &str, outcomes: &[SubtaskOutcome]) -> Synthesis {
        let successful: Vec<&SubtaskOutcome> = outcomes.iter().filter(|o| o.result.success).collect();

        if successful.is_empty() {
            return Synthesis {
                summary: "all agents failed".to_string(),
                confidence: 0.0,
                conflicts: vec![],
                resolutions: vec![],
            };
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut summary_parts = Vec::with_capacity(successful.len());

        for outcome in &successful {
            let relevance = profile_relevance(task_profile, &outcome.subtask.capability);
            let weight = outcome.result.confidence * relevance * evidence_weight(&outcome.result.evidence);
            weighted_sum += outcome.result.confidence * weight;
            weight_total += weight;
            summary_parts.push(outcome.result.output.clone());
        }

        let confidence = if weight_total > 0.0 {
            (weighted_sum / weight_total).min(1.0)
        } else {
            0.0
        };

        let conflicts = self.detect_conflicts(&successful);
        let resolutions = conflicts
            .iter()
            .map(|conflict| self.resolve(conflict, &successful))
            .collect();

        Synthesis {
            summary: summary_parts.join(" "),
            confidence,
            conflicts,
            resolutions,
        }
    }

    fn detect_conflicts(&self, successful: &[&SubtaskOutcome]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for i in 0..successful.len() {
            for j in (i + 1)..successful.len() {
                let a = successful[i];
                let b = successful[j];

                let contradiction = contradiction_score(&a.result.output, &b.result.output);
                let (conflict_type, score) = if contradiction > 0.7 {
                    (ConflictType::Contradiction, contradiction)
                } else {
                    let dissimilarity = jaccard_dissimilarity(&a.result.output, &b.result.output);
                    let inconsistency = (contradiction + dissimilarity) / 2.0;
                    if inconsistency > 0.6 {
                        (ConflictType::Inconsistency, inconsistency)
                    } else {
                        continue;
                    }
                };

                conflicts.push(Conflict {
                    id: Uuid::new_v4().to_string(),
                    agent_ids: vec![a.result.agent_id.clone(), b.result.agent_id.clone()],
                    conflict_type,
                    severity: severity_for(score),
                    evidence: a
                        .result
                        .evidence
                        .iter()
                        .chain(b.result.evidence.iter())
                        .cloned()
                        .collect(),
                });
            }
        }

        conflicts
    }

    fn resolve(&self, conflict: &Conflict, successful: &[&SubtaskOutcome]) -> Resolution {
        let participants: Vec<&&SubtaskOutcome> = successful
            .iter()
            .filter(|o| conflict.agent_ids.contains(&o.result.agent_id))
            .collect();

        match conflict.severity {
            Severity::Critical => self.resolve_via_expert(conflict, &participants),
            Severity::High => self.resolve_via_majority(conflict, &participants),
            Severity::Low | Severity::Medium => {
                let consensus = self.resolve_via_consensus(conflict, &participants);
                if consensus.resolution_type == ResolutionType::Escalation {
                    let capability = participants
                        .first()
                        .map(|o| o.subtask.capability.clone())
                        .unwrap_or_default();
                    self.resolve_via_fallback(conflict, &capability)
                } else {
                    consensus
                }
            }
        }
    }

    fn resolve_via_consensus(
        &self,
        conflict: &Conflict,
        participants: &[&&SubtaskOutcome],
    ) -> Resolution {
        let dissenters: Vec<&&&SubtaskOutcome> = participants
            .iter()
            .filter(|o| o.result.confidence < self.consensus_threshold)
            .collect();

        if dissenters.len() == participants.len() {
            return self.escalate(conflict);
        }

        let retained: Vec<&&&SubtaskOutcome> = participants
            .iter()
            .filter(|o| o.result.confidence >= self.consensus_threshold)
            .collect();

        let decision = retained
            .first()
            .map(|o| o.result.output.clone())
            .unwrap_or_default();
        let confidence = if retained.is_empty() {
            0.0
        } else {
            retained.iter().map(|o| o.result.confidence).sum::<f64>() / retained.len() as f64
        };

        Resolution {
            conflict_id: conflict.id.clone(),
            resolution_type: ResolutionType::Consensus,
            decision,
            confidence,
        }
    }

    fn resolve_via_majority(
        &self,
        conflict: &Conflict,
        participants: &[&&SubtaskOutcome],
    ) -> Resolution {
        let mut groups: HashMap<String, Vec<&&&SubtaskOutcome>> = HashMap::new();
        for outcome in participants {
            groups
                .entry(normalize(&outcome.result.output))
                .or_default()
                .push(outcome);
        }

        let mut sorted: Vec<(&String, &Vec<&&&SubtaskOutcome>)> = groups.iter().collect();
        sorted.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        match sorted.as_slice() {
            [] => self.escalate(conflict),
            [only] => {
                let confidence = average_confidence(only.1);
                Resolution {
                    conflict_id: conflict.id.clone(),
                    resolution_type: ResolutionType::Majority,
                    decision: only.1[0].result.output.clone(),
                    confidence,
                }
            }
            [first, second, ..] if first.1.len() == second.1.len() => self.escalate(conflict),
            [winner, ..] => {
                let confidence = average_confidence(winner.1);
                Resolution {
                    conflict_id: conflict.id.clone(),
                    resolution_type: ResolutionType::Majority,
                    decision: winner.1[0].result.output.clone(),
                    confidence,
                }
            }
        }
    }

    fn resolve_via_expert(&self, conflict: &Conflict, participants: &[&&SubtaskOutcome]) -> Resolution {
        let best = participants.iter().max_by(|a, b| {
            let score_a = expert_score(a);
            let score_b = expert_score(b);
            score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
        });

        match best {
            Some(outcome) => Resolution {
                conflict_id: conflict.id.clone(),
                resolution_type: ResolutionType::Expert,
                decision: outcome.result.output.clone(),
                confidence: outcome.result.confidence,
            },
            None => self.escalate(conflict),
        }
    }

    fn resolve_via_fallback(&self, conflict: &Conflict, capability: &str) -> Resolution {
        match self.fallback_opinions.get(capability) {
            Some(opinion) => Resolution {
                conflict_id: conflict.id.clone(),
                resolution_type: ResolutionType::Fallback,
                decision: opinion.clone(),
                confidence: 0.5,
            },
            None => self.escalate(conflict),
        }
    }

    fn escalate(&self, conflict: &Conflict) -> Resolution {
        Resolution {
            conflict_id: conflict.id.clone(),
            resolution_type: ResolutionType::Escalation,
            decision: "unresolved".to_string(),
            confidence: 0.0,
        }
    }
}

fn average_confidence(outcomes: &[&&SubtaskOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    outcomes.iter().map(|o| o.result.confidence).sum::<f64>() / outcomes.len() as f64
}

/// Approximates the expert-resolution formula (spec §4.7, limited to the
/// conflicting agents): success-rate-derived confidence stands in for the
/// full registry performance lookup, which the synthesizer does not hold
/// a handle to.
fn expert_score(outcome: &&SubtaskOutcome) -> f64 {
    outcome.result.confidence * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{AgentResult, EvidenceType, Priority, SubTask};
    use std::time::Duration;

    fn outcome(agent_id: &str, capability: &str, output: &str, confidence: f64, success: bool) -> SubtaskOutcome {
        SubtaskOutcome {
            subtask: SubTask {
                id: format!("sub-{agent_id}"),
                task_id: "t1".to_string(),
                agent_id: agent_id.to_string(),
                capability: capability.to_string(),
                query: "q".to_string(),
                dependencies: vec![],
                timeout: Priority::Medium.subtask_timeout(),
            },
            result: AgentResult {
                task_id: "t1".to_string(),
                agent_id: agent_id.to_string(),
                success,
                output: output.to_string(),
                error: None,
                duration: Duration::default(),
                confidence,
                evidence: vec![],
            },
        }
    }

    #[test]
    fn all_failed_results_in_failure_summary() {
        let synthesizer = ResultSynthesizer::default();
        let outcomes = vec![outcome("a1", "code_analysis", "x", 0.5, false)];
        let synthesis = synthesizer.synthesize("code_analysis", &outcomes);
        assert_eq!(synthesis.summary, "all agents failed");
        assert_eq!(synthesis.confidence, 0.0);
    }

    #[test]
    fn weighted_confidence_uses_profile_relevance() {
        let synthesizer = ResultSynthesizer::default();
        let outcomes = vec![outcome("a1", "code_analysis", "this module works", 0.9, true)];
        let synthesis = synthesizer.synthesize("code_analysis", &outcomes);
        assert!(synthesis.confidence > 0.0);
        assert!(synthesis.confidence <= 1.0);
    }

    #[test]
    fn direct_contradiction_pair_flagged_as_contradiction() {
        let synthesizer = ResultSynthesizer::default();
        let outcomes = vec![
            outcome("a1", "security", "this endpoint is secure", 0.9, true),
            outcome("a2", "security", "this endpoint is vulnerable", 0.9, true),
        ];
        let synthesis = synthesizer.synthesize("security", &outcomes);
        assert_eq!(synthesis.conflicts.len(), 1);
        assert_eq!(synthesis.conflicts[0].conflict_type, ConflictType::Contradiction);
    }

    #[test]
    fn critical_conflict_resolves_via_expert() {
        let synthesizer = ResultSynthesizer::default();
        let outcomes = vec![
            outcome("a1", "security", "it works fine here", 0.95, true),
            outcome("a2", "security", "it is totally broken", 0.6, true),
        ];
        let synthesis = synthesizer.synthesize("security", &outcomes);
        assert_eq!(synthesis.conflicts.len(), 1);
        assert_eq!(synthesis.resolutions.len(), 1);
        assert_eq!(synthesis.resolutions[0].resolution_type, ResolutionType::Expert);
        assert_eq!(synthesis.resolutions[0].decision, "it works fine here");
    }

    #[test]
    fn no_conflicts_when_outputs_agree() {
        let synthesizer = ResultSynthesizer::default();
        let outcomes = vec![
            outcome("a1", "code_analysis", "the handler validates input", 0.9, true),
            outcome("a2", "code_analysis", "the handler validates input well", 0.85, true),
        ];
        let synthesis = synthesizer.synthesize("code_analysis", &outcomes);
        assert!(synthesis.conflicts.is_empty());
    }

    #[test]
    fn evidence_weight_clamps_into_range() {
        let evidence = vec![Evidence {
            evidence_type: EvidenceType::SecurityScan,
            source: "scanner".to_string(),
            content: "clean".to_string(),
            confidence: 1.0,
        }];
        let weight = evidence_weight(&evidence);
        assert!(weight <= 1.5 && weight >= 0.5);
    }
}
