use thiserror::Error;

/// Convenience alias for Results using [`ConexusError`].
pub type Result<T> = std::result::Result<T, ConexusError>;

/// Classification of a per-connector failure, surfaced in federation metrics
/// but never allowed to fail an overall `context.search` request (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorFailureKind {
    Timeout,
    Network,
    Auth,
    RateLimit,
    Parse,
    Other,
}

impl std::fmt::Display for ConnectorFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectorFailureKind::Timeout => "timeout",
            ConnectorFailureKind::Network => "network",
            ConnectorFailureKind::Auth => "auth",
            ConnectorFailureKind::RateLimit => "rate_limit",
            ConnectorFailureKind::Parse => "parse",
            ConnectorFailureKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Which hook phase a [`ConexusError::HookFailure`] occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreInit,
    PostInit,
    PreShutdown,
    PostShutdown,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HookPhase::PreInit => "pre-init",
            HookPhase::PostInit => "post-init",
            HookPhase::PreShutdown => "pre-shutdown",
            HookPhase::PostShutdown => "post-shutdown",
        };
        write!(f, "{s}")
    }
}

/// Main error type for the Conexus core.
///
/// Every variant here corresponds to a tagged value in the error taxonomy
/// (spec §7); they are propagated as values, never as ad hoc strings, so
/// callers at federation and orchestrator boundaries can pattern-match on
/// kind rather than parse messages.
#[derive(Error, Debug)]
pub enum ConexusError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid connector: {0}")]
    InvalidConnector(String),

    #[error("no suitable agent for capability {capability}")]
    NoSuitableAgent { capability: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("connector failure ({kind}): {message}")]
    ConnectorFailure {
        kind: ConnectorFailureKind,
        message: String,
    },

    #[error("hook failure in {phase} phase: {causes:?}")]
    HookFailure {
        phase: HookPhase,
        causes: Vec<String>,
    },

    #[error("conflict {conflict_id} could not be resolved")]
    Unresolved { conflict_id: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ConexusError {
    /// Returns the sanitized, length-bounded message shown to MCP clients
    /// (spec §7: no API keys, tokens, or bearer strings; safe length).
    pub fn user_message(&self) -> String {
        crate::security::sanitize_error_message(&self.to_string())
    }
}
