//! System-wide constants for the Conexus core.
//!
//! Values here are internal tunable defaults (spec §9's "ambient
//! configuration" surface); `Config::load` may override most of them from
//! the environment.

/// Default deadline for a single federation scatter/gather request (§4.4).
pub const DEFAULT_FEDERATION_DEADLINE_MS: u64 = 10_000;

/// Default deadline for `ShutdownAll` when the caller supplies none (§4.3).
pub const DEFAULT_SHUTDOWN_ALL_DEADLINE_SECS: u64 = 30;

/// Default liveness timeout for the built-in `HealthCheck` hook (§4.3).
/// A caller-supplied deadline of zero or negative falls back to this value.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default orchestrator execution-context deadline (§4.9).
pub const DEFAULT_ORCHESTRATOR_DEADLINE_SECS: u64 = 300;

/// Default bound on concurrently in-flight agent invocations per task (§4.9).
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Health-scan interval for the Agent Registry background sweep (§4.7); an
/// agent not seen within 2x this interval is marked `unavailable`.
pub const DEFAULT_AGENT_HEALTH_INTERVAL_SECS: u64 = 60;

/// Default per-entry TTL for coordination cache entries (§4.6), shared
/// across the three cache kinds unless a per-kind override is configured.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default maximum entry count per cache kind before cleanup runs (§4.6).
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// Fraction of the lowest-access-time entries reclaimed by cleanup pass 2
/// when a cache kind is still over capacity after expiry sweep (§4.6).
pub const CACHE_EVICTION_FRACTION: f64 = 0.20;

/// Default page size when `context.search` omits `top_k` (§6.1).
pub const DEFAULT_TOP_K: u32 = 20;

/// Upper bound accepted for `top_k` (§6.1).
pub const MAX_TOP_K: u32 = 100;

/// Priority-scaled subtask timeouts (§4.8), in seconds.
pub const SUBTASK_TIMEOUT_CRITICAL_SECS: u64 = 10;
pub const SUBTASK_TIMEOUT_HIGH_SECS: u64 = 15;
pub const SUBTASK_TIMEOUT_MEDIUM_SECS: u64 = 30;
pub const SUBTASK_TIMEOUT_LOW_SECS: u64 = 60;

/// Conflict-resolution consensus dissent threshold (§4.10): dissenting
/// agents below this confidence are dropped under the `consensus` policy.
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.6;

/// Maximum length of a sanitized, user-visible error message (§7).
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 500;
