//! # Conexus Core
//!
//! The federated hybrid retrieval and multi-agent orchestration core of
//! Conexus, an agentic context engine exposed to AI assistants over MCP.
//!
//! ## Architecture
//!
//! - **Connectors** (`connectors`): durable connector config storage (C1),
//!   the live-handle registry (C2), and the init/shutdown lifecycle
//!   manager with ordered hook chains (C3).
//! - **Federation** (`federation`): parallel scatter/gather search across
//!   connectors (C4) and the result processing pipeline that normalizes,
//!   deduplicates, ranks, and paginates hits (C5).
//! - **Cache** (`cache`): the three-tier coordination cache fronting agent
//!   results, coordination plans, and performance data (C6).
//! - **Agents** (`agents`): agent registry and scoring (C7), task
//!   decomposition (C8), multi-agent orchestration (C9), and result
//!   synthesis with conflict resolution (C10).
//! - **MCP** (`mcp`): tool-handler logic for the `context.*` surface
//!   (wire transport/framing is out of scope for this crate).
//!
//! The embedding provider and vector store are consumed through the
//! `embedding` module's traits, not implemented here.

/// Agent registry, task decomposition, orchestration, and synthesis.
pub mod agents;
/// Coordination cache (C6).
pub mod cache;
/// System configuration (internal tunables only).
pub mod config;
/// System-wide constants.
pub mod constants;
/// Connector store, registry, and lifecycle manager (C1-C3).
pub mod connectors;
/// Embedder / vector store trait boundary (implementations out of scope).
pub mod embedding;
/// Error types and handling.
pub mod error;
/// Federation engine and result processor (C4-C5).
pub mod federation;
/// MCP tool-handler logic.
pub mod mcp;
/// Security utilities: error-message sanitization.
pub mod security;

pub use connectors::ConnectorHandle;
pub use error::{ConexusError, Result};
