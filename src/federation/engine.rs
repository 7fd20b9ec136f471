use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::FederationConfig;
use crate::connectors::registry::{ConnectorRegistry, SearchFilters, WorkContext};
use crate::connectors::types::{ConnectorType, SearchHit};
use crate::error::ConnectorFailureKind;
use crate::federation::result_processor::{ProcessedHit, ResultProcessor};
use crate::Result;

/// A single federated search request (spec §6.1 `context.search`).
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub work_context: WorkContext,
    pub top_k: u32,
    pub page: usize,
    pub source_types: Vec<String>,
    pub date_from: Option<chrono::DateTime<chrono::Utc>>,
    pub date_to: Option<chrono::DateTime<chrono::Utc>>,
    pub deadline: Option<Duration>,
}

/// Per-connector outcome recorded for observability (spec §4.4 step 5).
#[derive(Debug, Clone)]
pub struct ConnectorOutcome {
    pub connector_id: String,
    pub connector_type: ConnectorType,
    pub latency: Duration,
    pub result_count: usize,
    pub error: Option<ConnectorFailureKind>,
    pub timed_out: bool,
}

/// Result of a federated search (spec §4.4).
#[derive(Debug, Clone)]
pub struct FederationResult {
    pub hits: Vec<ProcessedHit>,
    pub total_count: usize,
    pub query_time_ms: u64,
    pub dedup_ratio: f64,
    pub connector_outcomes: Vec<ConnectorOutcome>,
    /// `max_connector_latency / sum_connector_latency` efficiency gauge.
    pub parallel_efficiency: f64,
}

/// Fans a search query across every eligible connector in parallel, then
/// hands the combined hits to the Result Processor (C4, spec §4.4).
pub struct FederationEngine {
    registry: Arc<ConnectorRegistry>,
    processor: ResultProcessor,
    config: FederationConfig,
}

impl FederationEngine {
    pub fn new(registry: Arc<ConnectorRegistry>, config: FederationConfig) -> Self {
        Self {
            registry,
            processor: ResultProcessor::new(),
            config,
        }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<FederationResult> {
        let started = Instant::now();

        let targets = self
            .registry
            .searchable_with_ids(&request.source_types)
            .await;

        if targets.is_empty() {
            debug!("federation: no searchable connectors for request");
            return Ok(FederationResult {
                hits: vec![],
                total_count: 0,
                query_time_ms: started.elapsed().as_millis() as u64,
                dedup_ratio: 0.0,
                connector_outcomes: vec![],
                parallel_efficiency: 0.0,
            });
        }

        let deadline = request.deadline.unwrap_or_else(|| self.config.default_deadline());
        let filters = SearchFilters {
            source_types: request.source_types.clone(),
            date_from: request.date_from,
            date_to: request.date_to,
        };

        let mut join_set = tokio::task::JoinSet::new();
        for (connector_id, connector_type, searchable) in targets {
            let query = request.query.clone();
            let work_context = request.work_context.clone();
            let filters = filters.clone();
            join_set.spawn(async move {
                let call_start = Instant::now();
                let outcome = tokio::time::timeout(
                    deadline,
                    searchable.search(&query, &work_context, &filters),
                )
                .await;
                (connector_id, connector_type, call_start.elapsed(), outcome)
            });
        }

        let mut all_hits: Vec<SearchHit> = Vec::new();
        let mut outcomes = Vec::new();
        let mut latencies: Vec<Duration> = Vec::new();

        while let Some(joined) = join_set.join_next().await {
            let (connector_id, connector_type, latency, outcome) = match joined {
                Ok(v) => v,
                Err(join_err) => {
                    warn!(error = %join_err, "connector search task panicked");
                    continue;
                }
            };

            latencies.push(latency);
            match outcome {
                Ok(Ok(hits)) => {
                    outcomes.push(ConnectorOutcome {
                        connector_id,
                        connector_type,
                        latency,
                        result_count: hits.len(),
                        error: None,
                        timed_out: false,
                    });
                    all_hits.extend(hits);
                }
                Ok(Err(e)) => {
                    warn!(connector_id = %connector_id, error = %e, "connector search failed");
                    outcomes.push(ConnectorOutcome {
                        connector_id,
                        connector_type,
                        latency,
                        result_count: 0,
                        error: Some(ConnectorFailureKind::Other),
                        timed_out: false,
                    });
                }
                Err(_elapsed) => {
                    warn!(connector_id = %connector_id, "connector search timed out");
                    outcomes.push(ConnectorOutcome {
                        connector_id,
                        connector_type,
                        latency,
                        result_count: 0,
                        error: Some(ConnectorFailureKind::Timeout),
                        timed_out: true,
                    });
                }
            }
        }

        let top_k = request.top_k.max(1) as usize;
        let page = request.page;
        let processed = self.processor.process(all_hits, page, top_k);

        let max_latency = latencies.iter().max().cloned().unwrap_or_default();
        let sum_latency: Duration = latencies.iter().sum();
        let parallel_efficiency = if sum_latency.as_secs_f64() > 0.0 {
            max_latency.as_secs_f64() / sum_latency.as_secs_f64()
        } else {
            0.0
        };

        Ok(FederationResult {
            hits: processed.hits,
            total_count: processed.total_count,
            query_time_ms: started.elapsed().as_millis() as u64,
            dedup_ratio: processed.dedup_ratio,
            connector_outcomes: outcomes,
            parallel_efficiency,
        })
    }
}
