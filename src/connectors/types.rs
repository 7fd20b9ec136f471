use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// The closed set of connector types (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    Filesystem,
    Github,
    Git,
    Database,
    Api,
    S3,
    Http,
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectorType::Filesystem => "filesystem",
            ConnectorType::Github => "github",
            ConnectorType::Git => "git",
            ConnectorType::Database => "database",
            ConnectorType::Api => "api",
            ConnectorType::S3 => "s3",
            ConnectorType::Http => "http",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" => Ok(ConnectorType::Filesystem),
            "github" => Ok(ConnectorType::Github),
            "git" => Ok(ConnectorType::Git),
            "database" => Ok(ConnectorType::Database),
            "api" => Ok(ConnectorType::Api),
            "s3" => Ok(ConnectorType::S3),
            "http" => Ok(ConnectorType::Http),
            other => Err(format!("unknown connector type: {other}")),
        }
    }
}

/// Connector lifecycle status (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorStatus {
    Active,
    Inactive,
    Error,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectorStatus::Active => "active",
            ConnectorStatus::Inactive => "inactive",
            ConnectorStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConnectorStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ConnectorStatus::Active),
            "inactive" => Ok(ConnectorStatus::Inactive),
            "error" => Ok(ConnectorStatus::Error),
            other => Err(format!("unknown connector status: {other}")),
        }
    }
}

/// A connector configuration record, owned by the Connector Store (C1)
/// and (once initialized) the Lifecycle Manager (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub connector_type: ConnectorType,
    pub config: HashMap<String, Value>,
    pub status: ConnectorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connector {
    /// Validates the invariants required by C1.Add / C1.Update (spec §4.1):
    /// id, name, type and status must be non-empty (type/status are
    /// statically closed sets, enforced by the enum itself).
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("connector id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("connector name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Observational rate-limit snapshot reported by a connector (spec §3).
/// Never enforced by the core; surfaced for informational purposes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub remaining: u64,
    pub reset: DateTime<Utc>,
    pub limit: Option<u64>,
}

/// Observational sync-state snapshot reported by a connector (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub in_progress: bool,
    pub error: Option<String>,
    pub rate_limit: Option<RateLimitInfo>,
}

/// Derived (never stored) boolean capability set, produced by probing a
/// connector handle at query time (spec §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorCapabilities {
    pub supports_search: bool,
    pub supports_sync: bool,
    pub supports_resource_listing: bool,
    pub has_rate_limit: bool,
}

/// A single search result returned by a connector (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub source_type: String,
    pub metadata: HashMap<String, Value>,
    pub connector_id: String,
    pub connector_type: ConnectorType,
}

impl SearchHit {
    /// Deterministic hash of (normalized source identity, normalized
    /// content prefix), used to collapse duplicates from overlapping
    /// connectors (spec §3, §4.5b).
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let normalized_id = self.id.trim().to_lowercase();
        let content_prefix: String = self
            .content
            .trim()
            .to_lowercase()
            .chars()
            .take(256)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(normalized_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(content_prefix.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hit(id: &str, content: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            content: content.to_string(),
            score: 1.0,
            source_type: "file".to_string(),
            metadata: HashMap::new(),
            connector_id: "c1".to_string(),
            connector_type: ConnectorType::Filesystem,
        }
    }

    #[test]
    fn fingerprint_is_stable_for_identical_hits() {
        let a = sample_hit("README.md", "hello world");
        let b = sample_hit("README.md", "hello world");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_is_case_and_whitespace_insensitive() {
        let a = sample_hit("README.md", "hello world");
        let b = sample_hit(" readme.md ", "  Hello World  ");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_for_distinct_content() {
        let a = sample_hit("README.md", "hello world");
        let b = sample_hit("README.md", "goodbye world");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn connector_type_round_trips_through_str() {
        for ct in [
            ConnectorType::Filesystem,
            ConnectorType::Github,
            ConnectorType::Git,
            ConnectorType::Database,
            ConnectorType::Api,
            ConnectorType::S3,
            ConnectorType::Http,
        ] {
            let s = ct.to_string();
            let parsed: ConnectorType = s.parse().unwrap();
            assert_eq!(parsed, ct);
        }
    }

    #[test]
    fn connector_validate_rejects_empty_id() {
        let c = Connector {
            id: "".to_string(),
            name: "x".to_string(),
            connector_type: ConnectorType::Filesystem,
            config: HashMap::new(),
            status: ConnectorStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(c.validate().is_err());
    }
}
