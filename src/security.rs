//! Centralized security-sensitive operations: redaction of secrets from
//! user-visible error messages (spec §7).
use regex::Regex;
use std::sync::OnceLock;

use crate::constants::MAX_ERROR_MESSAGE_LENGTH;

fn secret_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"sk-[A-Za-z0-9_-]{10,}").unwrap(),
            Regex::new(r"(?i)bearer\s+[A-Za-z0-9._-]+").unwrap(),
            Regex::new(r"(?i)(api[_-]?key|token|secret|password)\s*[:=]\s*\S+").unwrap(),
        ]
    })
}

/// Redacts API keys, tokens, and bearer strings from a raw error message and
/// truncates it to [`MAX_ERROR_MESSAGE_LENGTH`], per the "sanitized, no API
/// keys/tokens/bearer strings... truncated to a safe length" requirement.
pub fn sanitize_error_message(raw: &str) -> String {
    let mut sanitized = raw.to_string();
    for pattern in secret_patterns() {
        sanitized = pattern.replace_all(&sanitized, "[redacted]").into_owned();
    }

    if sanitized.chars().count() > MAX_ERROR_MESSAGE_LENGTH {
        let truncated: String = sanitized.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
        format!("{truncated}...")
    } else {
        sanitized
    }
}
