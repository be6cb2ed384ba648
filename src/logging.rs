//! Tracing setup and secret redaction.
//!
//! stdout carries the JSON-RPC channel, so the subscriber always writes to stderr.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "SMARTMARKS_LOG";

pub const REDACTED: &str = "***REDACTED***";

/// Object keys whose values are always masked (compared case-insensitively, by containment).
const SENSITIVE_KEYS: &[&str] = &[
    "apikey",
    "api_key",
    "token",
    "secret",
    "openaikey",
    "geminikey",
    "deepseekkey",
    "linkpreviewkey",
    "password",
    "pwd",
    "authorization",
];

static OPENAI_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sk-[A-Za-z0-9_-]{20,}$").expect("static regex"));
static GOOGLE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^AI[A-Za-z0-9_-]{35,}$").expect("static regex"));
static TOKEN_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{21,}$").expect("static regex"));

/// Installs the global subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Whether a string has the shape of an API key or bearer token.
pub fn looks_like_secret(value: &str) -> bool {
    let value = value.trim();
    OPENAI_KEY.is_match(value) || GOOGLE_KEY.is_match(value) || TOKEN_LIKE.is_match(value)
}

/// Masks `value` when it looks like a credential.
pub fn redact(value: &str) -> String {
    if looks_like_secret(value) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| lower.contains(k))
}

/// Recursively masks sensitive fields and key-shaped strings in a JSON value.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(redact(s)),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                let masked = if is_sensitive_key(key) && !is_empty_value(v) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact_json(v)
                };
                out.insert(key.clone(), masked);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}
