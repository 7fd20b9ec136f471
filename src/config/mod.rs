use crate::constants::*;
use crate::{ConexusError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Internal runtime tunables for the Conexus core.
///
/// This is *not* the excluded CLI/config-loader layer (which owns process
/// bootstrapping, secrets, and connector wiring) — it is the core's own
/// tunable surface: deadlines, concurrency limits, and cache sizing that
/// the components in this crate read directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub federation: FederationConfig,
    pub lifecycle: LifecycleConfig,
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
    pub agent_registry: AgentRegistryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    pub default_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub shutdown_all_deadline_secs: u64,
    pub health_check_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub deadline_secs: u64,
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistryConfig {
    pub health_interval_secs: u64,
}

impl Config {
    /// Loads configuration from the environment, falling back to the
    /// defaults in [`crate::constants`] for anything unset or unparsable.
    ///
    /// Mirrors the teacher's `Config::load` shape: `.env` is loaded
    /// best-effort, each field is read with `unwrap_or`, and only genuinely
    /// invalid values (not merely absent ones) produce an error.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {e}"),
        }

        let federation = FederationConfig {
            default_deadline_ms: parse_env_or(
                "CONEXUS_FEDERATION_DEADLINE_MS",
                DEFAULT_FEDERATION_DEADLINE_MS,
            )?,
        };

        let lifecycle = LifecycleConfig {
            shutdown_all_deadline_secs: parse_env_or(
                "CONEXUS_SHUTDOWN_ALL_DEADLINE_SECS",
                DEFAULT_SHUTDOWN_ALL_DEADLINE_SECS,
            )?,
            health_check_timeout_secs: parse_env_or(
                "CONEXUS_HEALTH_CHECK_TIMEOUT_SECS",
                DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            )?,
        };

        let orchestrator = OrchestratorConfig {
            deadline_secs: parse_env_or(
                "CONEXUS_ORCHESTRATOR_DEADLINE_SECS",
                DEFAULT_ORCHESTRATOR_DEADLINE_SECS,
            )?,
            max_concurrency: parse_env_or(
                "CONEXUS_MAX_CONCURRENCY",
                DEFAULT_MAX_CONCURRENCY,
            )?,
        };

        if orchestrator.max_concurrency == 0 {
            return Err(ConexusError::Config(
                "CONEXUS_MAX_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let cache = CacheConfig {
            default_ttl_secs: parse_env_or("CONEXUS_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS)?,
            max_entries: parse_env_or(
                "CONEXUS_CACHE_MAX_ENTRIES",
                DEFAULT_CACHE_MAX_ENTRIES,
            )?,
        };

        if cache.max_entries == 0 {
            return Err(ConexusError::Config(
                "CONEXUS_CACHE_MAX_ENTRIES must be at least 1".to_string(),
            ));
        }

        let agent_registry = AgentRegistryConfig {
            health_interval_secs: parse_env_or(
                "CONEXUS_AGENT_HEALTH_INTERVAL_SECS",
                DEFAULT_AGENT_HEALTH_INTERVAL_SECS,
            )?,
        };

        Ok(Config {
            federation,
            lifecycle,
            orchestrator,
            cache,
            agent_registry,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            federation: FederationConfig {
                default_deadline_ms: DEFAULT_FEDERATION_DEADLINE_MS,
            },
            lifecycle: LifecycleConfig {
                shutdown_all_deadline_secs: DEFAULT_SHUTDOWN_ALL_DEADLINE_SECS,
                health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            },
            orchestrator: OrchestratorConfig {
                deadline_secs: DEFAULT_ORCHESTRATOR_DEADLINE_SECS,
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
            },
            cache: CacheConfig {
                default_ttl_secs: DEFAULT_CACHE_TTL_SECS,
                max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            },
            agent_registry: AgentRegistryConfig {
                health_interval_secs: DEFAULT_AGENT_HEALTH_INTERVAL_SECS,
            },
        }
    }
}

impl FederationConfig {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }
}

impl LifecycleConfig {
    pub fn shutdown_all_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_all_deadline_secs)
    }

    /// Applies the "zero/negative falls back to default" rule from §4.3's
    /// `HealthCheck` hook description to a caller-supplied override.
    pub fn health_check_timeout(&self, override_secs: Option<i64>) -> Duration {
        match override_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            _ => Duration::from_secs(self.health_check_timeout_secs),
        }
    }
}

impl OrchestratorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConexusError::Config(format!("{key} is set but not a valid value"))),
        Err(_) => Ok(default),
    }
}
