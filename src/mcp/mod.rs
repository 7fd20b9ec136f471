//! `context.*` tool-handler logic (spec §6.1). Line-delimited JSON-RPC
//! framing over stdio is out of scope here; these handlers take already-
//! parsed parameters and return already-built results, ready to be
//! wrapped by whatever transport a caller wires up.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::connectors::registry::WorkContext;
use crate::connectors::store::ConnectorStore;
use crate::connectors::ConnectorRegistry;
use crate::federation::{FederationEngine, SearchRequest};
use crate::{ConexusError, Result};

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SearchFilterParams {
    #[serde(default)]
    pub source_types: Vec<String>,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub work_context: Option<WorkContextParams>,
    pub top_k: Option<u32>,
    pub filters: Option<SearchFilterParams>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WorkContextParams {
    pub active_file: Option<String>,
    pub git_branch: Option<String>,
    #[serde(default)]
    pub open_ticket_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub source_type: String,
    pub connector_id: String,
    pub connector_type: String,
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct SearchToolResult {
    pub results: Vec<SearchResultItem>,
    pub total_count: usize,
    pub query_time_ms: u64,
}

/// `context.search` (spec §6.1). `top_k` is clamped to 1..=100.
pub async fn search(engine: &FederationEngine, params: SearchParams) -> Result<SearchToolResult> {
    if params.query.trim().is_empty() {
        return Err(ConexusError::InvalidConfig("query must not be empty".to_string()));
    }

    let top_k = params.top_k.unwrap_or(20).clamp(1, 100);
    let work_context = params
        .work_context
        .map(|w| WorkContext {
            active_file: w.active_file,
            git_branch: w.git_branch,
            open_ticket_ids: w.open_ticket_ids,
        })
        .unwrap_or_default();

    let (source_types, date_from, date_to) = match params.filters {
        Some(f) => {
            let (from, to) = f
                .date_range
                .map(|r| (r.from, r.to))
                .unwrap_or((None, None));
            (f.source_types, from, to)
        }
        None => (vec![], None, None),
    };

    let request = SearchRequest {
        query: params.query,
        work_context,
        top_k,
        page: 0,
        source_types,
        date_from,
        date_to,
        deadline: None,
    };

    let result = engine.search(request).await?;

    let results = result
        .hits
        .into_iter()
        .map(|processed| SearchResultItem {
            id: processed.hit.id,
            content: processed.hit.content,
            score: processed.normalized_score,
            source_type: processed.hit.source_type,
            connector_id: processed.hit.connector_id,
            connector_type: processed.hit.connector_type.to_string(),
            metadata: processed.hit.metadata,
        })
        .collect();

    Ok(SearchToolResult {
        results,
        total_count: result.total_count,
        query_time_ms: result.query_time_ms,
    })
}

#[derive(Debug, Deserialize)]
pub struct GetRelatedInfoParams {
    pub file_path: Option<String>,
    pub ticket_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetRelatedInfoResult {
    pub summary: String,
    pub references: Vec<String>,
}

/// `context.get_related_info` (spec §6.1). Builds a federated search query
/// from whichever hint is present and surfaces the top hits as references.
pub async fn get_related_info(
    engine: &FederationEngine,
    params: GetRelatedInfoParams,
) -> Result<GetRelatedInfoResult> {
    let query = match (&params.file_path, &params.ticket_id) {
        (None, None) => {
            return Err(ConexusError::InvalidConfig(
                "at least one of file_path or ticket_id is required".to_string(),
            ))
        }
        (Some(path), None) => path.clone(),
        (None, Some(ticket)) => ticket.clone(),
        (Some(path), Some(ticket)) => format!("{path} {ticket}"),
    };

    let work_context = WorkContext {
        active_file: params.file_path,
        git_branch: None,
        open_ticket_ids: params.ticket_id.into_iter().collect(),
    };

    let request = SearchRequest {
        query: query.clone(),
        work_context,
        top_k: 10,
        page: 0,
        source_types: vec![],
        date_from: None,
        date_to: None,
        deadline: None,
    };

    let result = engine.search(request).await?;

    let references: Vec<String> = result
        .hits
        .iter()
        .map(|h| format!("{}:{}", h.hit.connector_id, h.hit.id))
        .collect();

    let summary = if references.is_empty() {
        format!("no related information found for {query}")
    } else {
        format!("{} related item(s) found for {query}", references.len())
    };

    Ok(GetRelatedInfoResult { summary, references })
}

#[derive(Debug, Deserialize)]
pub struct IndexControlParams {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct IndexControlResult {
    pub state: String,
}

/// `context.index_control` (spec §6.1). Only `status` is required; every
/// other action returns a not-implemented error.
pub async fn index_control(params: IndexControlParams) -> Result<IndexControlResult> {
    match params.action.as_str() {
        "status" => Ok(IndexControlResult {
            state: "idle".to_string(),
        }),
        other => Err(ConexusError::InvalidConfig(format!(
            "index_control action '{other}' is not implemented"
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectorManagementParams {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectorSummary {
    pub id: String,
    pub name: String,
    pub connector_type: String,
    pub status: String,
    pub rate_limit_remaining: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ConnectorManagementResult {
    pub connectors: Vec<ConnectorSummary>,
}

/// `context.connector_management` (spec §6.1). Only `list` and `status`
/// are required; `add`/`remove`/`sync` return a not-implemented error.
pub async fn connector_management(
    store: &dyn ConnectorStore,
    registry: &Arc<ConnectorRegistry>,
    params: ConnectorManagementParams,
) -> Result<ConnectorManagementResult> {
    match params.action.as_str() {
        "list" => {
            let connectors = store.list().await?;
            Ok(ConnectorManagementResult {
                connectors: connectors
                    .into_iter()
                    .map(|c| ConnectorSummary {
                        id: c.id,
                        name: c.name,
                        connector_type: c.connector_type.to_string(),
                        status: c.status.to_string(),
                        rate_limit_remaining: None,
                    })
                    .collect(),
            })
        }
        "status" => {
            let connectors = store.list().await?;
            let mut summaries = Vec::with_capacity(connectors.len());
            for c in connectors {
                let remaining = match registry.get(&c.id).await {
                    Some(handle) => {
                        let limit = tokio::time::timeout(Duration::from_secs(5), handle.rate_limit())
                            .await
                            .ok();
                        limit.map(|l| l.remaining)
                    }
                    None => None,
                };
                summaries.push(ConnectorSummary {
                    id: c.id,
                    name: c.name,
                    connector_type: c.connector_type.to_string(),
                    status: c.status.to_string(),
                    rate_limit_remaining: remaining,
                });
            }
            Ok(ConnectorManagementResult { connectors: summaries })
        }
        other => Err(ConexusError::InvalidConfig(format!(
            "connector_management action '{other}' is not implemented"
        ))),
    }
}
