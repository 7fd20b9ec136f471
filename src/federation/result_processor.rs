use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::connectors::types::SearchHit;

/// A hit after score normalization, carrying both the connector-local raw
/// score and the cross-connector normalized score used for ranking.
#[derive(Debug, Clone)]
pub struct ProcessedHit {
    pub hit: SearchHit,
    pub normalized_score: f64,
}

/// Per-stage timing, published for observability (spec §4.5: "all stages
/// publish their duration").
#[derive(Debug, Clone, Default)]
pub struct StageDurations {
    pub normalize: Duration,
    pub deduplicate: Duration,
    pub merge_and_rank: Duration,
    pub paginate: Duration,
}

/// Output of the Result Processor pipeline (C5).
#[derive(Debug, Clone)]
pub struct ProcessedResults {
    pub hits: Vec<ProcessedHit>,
    pub total_count: usize,
    pub dedup_ratio: f64,
    pub durations: StageDurations,
}

/// Pure in-memory pipeline: normalize, deduplicate, merge/rank, paginate
/// (spec §4.5). No I/O; every stage is a plain function over `Vec<SearchHit>`
/// so it can be tested independent of the federation engine.
#[derive(Default)]
pub struct ResultProcessor;

impl ResultProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, hits: Vec<SearchHit>, page: usize, page_size: usize) -> ProcessedResults {
        let mut durations = StageDurations::default();

        let start = Instant::now();
        let normalized = normalize_scores(hits);
        durations.normalize = start.elapsed();

        let start = Instant::now();
        let (deduped, dedup_ratio) = deduplicate(normalized);
        durations.deduplicate = start.elapsed();

        let start = Instant::now();
        let ranked = merge_and_rank(deduped);
        durations.merge_and_rank = start.elapsed();

        let total_count = ranked.len();

        let start = Instant::now();
        let page_hits = paginate(ranked, page, page_size);
        durations.paginate = start.elapsed();

        ProcessedResults {
            hits: page_hits,
            total_count,
            dedup_ratio,
            durations,
        }
    }
}

/// Stage (a): each connector's hits are scaled to [0,1] by min-max over
/// that connector's own returned raw scores; a degenerate single-score
/// (or all-equal) case yields 1.0 (spec §4.5a).
fn normalize_scores(hits: Vec<SearchHit>) -> Vec<ProcessedHit> {
    let mut by_connector: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, hit) in hits.iter().enumerate() {
        by_connector.entry(hit.connector_id.clone()).or_default().push(idx);
    }

    let mut normalized_score = vec![0.0_f64; hits.len()];
    for indices in by_connector.values() {
        let scores: Vec<f64> = indices.iter().map(|&i| hits[i].score).collect();
        let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        for &i in indices {
            normalized_score[i] = if (max - min).abs() < f64::EPSILON {
                1.0
            } else {
                (hits[i].score - min) / (max - min)
            };
        }
    }

    hits.into_iter()
        .zip(normalized_score)
        .map(|(hit, normalized_score)| ProcessedHit {
            hit,
            normalized_score,
        })
        .collect()
}

/// Stage (b): collapse hits sharing a fingerprint, keeping the
/// highest-normalized-score hit and unioning metadata; returns the
/// reduction ratio (spec §4.5b).
fn deduplicate(hits: Vec<ProcessedHit>) -> (Vec<ProcessedHit>, f64) {
    let original_count = hits.len();
    let mut by_fingerprint: HashMap<String, ProcessedHit> = HashMap::new();

    for mut candidate in hits {
        let fingerprint = candidate.hit.fingerprint();
        match by_fingerprint.get_mut(&fingerprint) {
            Some(existing) => {
                for (k, v) in candidate.hit.metadata.drain() {
                    existing.hit.metadata.entry(k).or_insert(v);
                }
                if candidate.normalized_score > existing.normalized_score {
                    let merged_metadata = existing.hit.metadata.clone();
                    existing.hit = candidate.hit;
                    existing.hit.metadata = merged_metadata;
                    existing.normalized_score = candidate.normalized_score;
                }
            }
            None => {
                by_fingerprint.insert(fingerprint, candidate);
            }
        }
    }

    let deduped: Vec<ProcessedHit> = by_fingerprint.into_values().collect();
    let reduced_count = deduped.len();
    let ratio = if original_count == 0 {
        0.0
    } else {
        1.0 - (reduced_count as f64 / original_count as f64)
    };
    (deduped, ratio)
}

/// Stage (c): stable-sort by normalized score descending, tie-break by
/// `(connector_type, connector_id, id)` lexicographically for determinism
/// (spec §4.5c).
fn merge_and_rank(mut hits: Vec<ProcessedHit>) -> Vec<ProcessedHit> {
    hits.sort_by(|a, b| {
        b.normalized_score
            .partial_cmp(&a.normalized_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.hit.connector_type.to_string().cmp(&b.hit.connector_type.to_string()))
            .then_with(|| a.hit.connector_id.cmp(&b.hit.connector_id))
            .then_with(|| a.hit.id.cmp(&b.hit.id))
    });
    hits
}

/// Stage (d): slice the globally ordered list by `(page, page_size)` with
/// half-open bounds (spec §4.5d). `page` is zero-indexed.
fn paginate(hits: Vec<ProcessedHit>, page: usize, page_size: usize) -> Vec<ProcessedHit> {
    if page_size == 0 {
        return Vec::new();
    }
    let start = page.saturating_mul(page_size);
    if start >= hits.len() {
        return Vec::new();
    }
    let end = (start + page_size).min(hits.len());
    hits[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::connectors::types::ConnectorType;

    fn hit(id: &str, connector_id: &str, score: f64) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            content: format!("content for {id}"),
            score,
            source_type: "file".to_string(),
            metadata: HashMap::new(),
            connector_id: connector_id.to_string(),
            connector_type: ConnectorType::Filesystem,
        }
    }

    #[test]
    fn normalize_scales_per_connector_independently() {
        let hits = vec![hit("a", "c1", 10.0), hit("b", "c1", 20.0), hit("c", "c2", 5.0)];
        let normalized = normalize_scores(hits);

        let a = normalized.iter().find(|h| h.hit.id == "a").unwrap();
        let b = normalized.iter().find(|h| h.hit.id == "b").unwrap();
        let c = normalized.iter().find(|h| h.hit.id == "c").unwrap();

        assert_eq!(a.normalized_score, 0.0);
        assert_eq!(b.normalized_score, 1.0);
        // single-score connector: degenerate case yields 1.0
        assert_eq!(c.normalized_score, 1.0);
    }

    #[test]
    fn deduplicate_keeps_highest_score_and_unions_metadata() {
        let mut h1 = hit("same-id", "a", 0.9);
        h1.content = "shared content".to_string();
        h1.metadata.insert("from".to_string(), json!("a"));

        let mut h2 = hit("same-id", "b", 0.4);
        h2.content = "shared content".to_string();
        h2.metadata.insert("extra".to_string(), json!("b"));

        let processed = vec![
            ProcessedHit {
                hit: h1,
                normalized_score: 0.9,
            },
            ProcessedHit {
                hit: h2,
                normalized_score: 0.4,
            },
        ];

        let (deduped, ratio) = deduplicate(processed);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].normalized_score, 0.9);
        assert!(deduped[0].hit.metadata.contains_key("from"));
        assert!(deduped[0].hit.metadata.contains_key("extra"));
        assert_eq!(ratio, 0.5);
    }

    #[test]
    fn merge_and_rank_orders_by_score_then_tiebreak() {
        let hits = vec![
            ProcessedHit {
                hit: hit("z", "c2", 0.0),
                normalized_score: 0.5,
            },
            ProcessedHit {
                hit: hit("a", "c1", 0.0),
                normalized_score: 0.5,
            },
        ];
        let ranked = merge_and_rank(hits);
        assert_eq!(ranked[0].hit.connector_id, "c1");
        assert_eq!(ranked[1].hit.connector_id, "c2");
    }

    #[test]
    fn paginate_respects_half_open_bounds() {
        let hits: Vec<ProcessedHit> = (0..5)
            .map(|i| ProcessedHit {
                hit: hit(&i.to_string(), "c1", 0.0),
                normalized_score: 0.0,
            })
            .collect();

        let page0 = paginate(hits.clone(), 0, 2);
        assert_eq!(page0.len(), 2);
        let page2 = paginate(hits.clone(), 2, 2);
        assert_eq!(page2.len(), 1);
        let page3 = paginate(hits, 3, 2);
        assert_eq!(page3.len(), 0);
    }

    #[test]
    fn process_is_order_independent_given_same_inputs() {
        let processor = ResultProcessor::new();
        let hits_a = vec![hit("a", "c1", 1.0), hit("b", "c1", 2.0), hit("c", "c2", 3.0)];
        let mut hits_b = hits_a.clone();
        hits_b.reverse();

        let result_a = processor.process(hits_a, 0, 10);
        let result_b = processor.process(hits_b, 0, 10);

        let ids_a: Vec<_> = result_a.hits.iter().map(|h| h.hit.id.clone()).collect();
        let ids_b: Vec<_> = result_b.hits.iter().map(|h| h.hit.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn total_count_reflects_pre_pagination_size() {
        let processor = ResultProcessor::new();
        let hits = vec![hit("a", "c1", 1.0), hit("b", "c1", 2.0), hit("c", "c2", 3.0)];
        let result = processor.process(hits, 0, 1);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.hits.len(), 1);
    }
}
