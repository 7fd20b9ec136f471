use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Agent health/availability status (spec §3). Transitions only via the
/// Agent Registry (C7); `LastSeen` is monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Available,
    Busy,
    Unavailable,
    Error,
    Maintenance,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Unavailable => "unavailable",
            AgentStatus::Error => "error",
            AgentStatus::Maintenance => "maintenance",
        };
        write!(f, "{s}")
    }
}

/// An agent participating in multi-agent task execution (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub capabilities: Vec<Capability>,
    pub profile: String,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Free-form key/value metadata, matched against subtask requirements
    /// by the `FindBestAgent` scoring formula (spec §4.7).
    pub metadata: HashMap<String, String>,
}

/// Closed set of capability categories (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityCategory {
    Analysis,
    Search,
    Debugging,
    Documentation,
    Security,
    Architecture,
}

impl fmt::Display for CapabilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityCategory::Analysis => "analysis",
            CapabilityCategory::Search => "search",
            CapabilityCategory::Debugging => "debugging",
            CapabilityCategory::Documentation => "documentation",
            CapabilityCategory::Security => "security",
            CapabilityCategory::Architecture => "architecture",
        };
        write!(f, "{s}")
    }
}

/// Rolling performance data for one (agent, capability) pair, feeding both
/// the C7 `FindBestAgent` formula and C10's expert-resolution formula.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Performance {
    /// 0-100.
    pub success_rate: f64,
    pub avg_latency_seconds: f64,
    /// 0.0-1.0.
    pub error_rate: f64,
    pub load: f64,
    pub capacity: f64,
    pub throughput: f64,
}

impl Default for Performance {
    fn default() -> Self {
        Performance {
            success_rate: 100.0,
            avg_latency_seconds: 0.0,
            error_rate: 0.0,
            load: 0.0,
            capacity: 1.0,
            throughput: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub category: CapabilityCategory,
    pub skills: Vec<String>,
    pub performance: Option<Performance>,
}

/// Task priority (spec §3), used both for orchestrator deadlines and
/// decomposer subtask timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Subtask timeout scaled inversely with priority (spec §4.8).
    pub fn subtask_timeout(&self) -> Duration {
        use crate::constants::*;
        let secs = match self {
            Priority::Critical => SUBTASK_TIMEOUT_CRITICAL_SECS,
            Priority::High => SUBTASK_TIMEOUT_HIGH_SECS,
            Priority::Medium => SUBTASK_TIMEOUT_MEDIUM_SECS,
            Priority::Low => SUBTASK_TIMEOUT_LOW_SECS,
        };
        Duration::from_secs(secs)
    }
}

/// A top-level multi-agent request (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAgentTask {
    pub id: String,
    pub query: String,
    pub profile: String,
    pub context: HashMap<String, Value>,
    pub requirements: HashMap<String, String>,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
}

/// A single unit of work assigned to exactly one agent (spec §3). The
/// transitive closure of `dependencies` must be acyclic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub task_id: String,
    pub agent_id: String,
    pub capability: String,
    pub query: String,
    pub dependencies: Vec<String>,
    pub timeout: Duration,
}

/// Evidence cited by an `AgentResult` (spec §3), weighted by `evidence_type`
/// in C10's synthesis formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_type: EvidenceType,
    pub source: String,
    pub content: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Analysis,
    CodeExample,
    TestResult,
    Documentation,
    Discussion,
    Configuration,
    Performance,
    SecurityScan,
    ErrorLog,
    StackTrace,
    UserFeedback,
}

impl EvidenceType {
    /// Per-type weight used in evidence-weight averaging (spec §4.10).
    pub fn weight(&self) -> f64 {
        match self {
            EvidenceType::Analysis => 1.0,
            EvidenceType::CodeExample => 1.2,
            EvidenceType::TestResult => 1.1,
            EvidenceType::Documentation => 0.9,
            EvidenceType::Discussion => 0.8,
            EvidenceType::Configuration => 0.7,
            EvidenceType::Performance => 1.1,
            EvidenceType::SecurityScan => 1.3,
            EvidenceType::ErrorLog => 1.0,
            EvidenceType::StackTrace => 1.1,
            EvidenceType::UserFeedback => 0.6,
        }
    }
}

/// The outcome of one subtask's execution by one agent (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub task_id: String,
    pub agent_id: String,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Contradiction,
    Inconsistency,
    Ambiguity,
    Gap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub agent_ids: Vec<String>,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionType {
    Consensus,
    Majority,
    Expert,
    Fallback,
    Escalation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub conflict_id: String,
    pub resolution_type: ResolutionType,
    pub decision: String,
    pub confidence: f64,
}
