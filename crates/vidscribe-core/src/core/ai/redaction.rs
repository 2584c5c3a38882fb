//! Credential redaction for anything derived from an outbound call.

use std::sync::OnceLock;

use regex::Regex;

const MASK: &str = "[REDACTED]";

fn query_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)([?&](?:key|api_key|apikey)=)[^&\s"']+"#).expect("valid regex")
    })
}

fn bearer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9\-._~+/=]+").expect("valid regex"))
}

/// Masks the literal secret, `key=` query parameters and bearer tokens.
pub fn redact_secrets(text: &str, secret: Option<&str>) -> String {
    let mut redacted = match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, MASK),
        _ => text.to_string(),
    };
    redacted = query_key_pattern()
        .replace_all(&redacted, format!("${{1}}{}", MASK).as_str())
        .into_owned();
    redacted = bearer_pattern()
        .replace_all(&redacted, format!("${{1}}{}", MASK).as_str())
        .into_owned();
    redacted
}
