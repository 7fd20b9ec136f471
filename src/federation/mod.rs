//! Federation Engine (C4) and Result Processor (C5): parallel scatter/
//! gather search across connectors, followed by normalization,
//! deduplication, ranking, and pagination.
pub mod engine;
pub mod result_processor;

pub use engine::{ConnectorOutcome, FederationEngine, FederationResult, SearchRequest};
pub use result_processor::{ProcessedHit, ProcessedResults, ResultProcessor};
