//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SockioSettings::default()`]
//! 2. If `~/.sockio/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SOCKIO_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{DispatchMode, MIN_QUEUE_CAPACITY, SockioSettings};

/// Resolve the path to the settings file (`~/.sockio/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sockio").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SockioSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the merged result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SockioSettings> {
    let defaults = serde_json::to_value(SockioSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SockioSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid or out-of-range values are ignored with a warning and the
/// file/default value stays in effect.
pub fn apply_env_overrides(settings: &mut SockioSettings) {
    // ── Session settings ────────────────────────────────────────────
    if let Some(v) = read_env_usize("SOCKIO_QUEUE_CAPACITY", MIN_QUEUE_CAPACITY, 1_000_000) {
        settings.session.queue_capacity = v;
    }
    if let Some(v) = read_env_string("SOCKIO_DISPATCH_MODE") {
        match parse_dispatch_mode(&v) {
            Some(mode) => settings.session.dispatch_mode = mode,
            None => tracing::warn!(key = "SOCKIO_DISPATCH_MODE", value = %v, "invalid dispatch mode, ignoring"),
        }
    }
    if let Some(v) = read_env_usize("SOCKIO_MAX_CONCURRENT_DISPATCH", 1, 100_000) {
        settings.session.max_concurrent_dispatch = Some(v);
    }
    if let Some(v) = read_env_u64("SOCKIO_ACK_TIMEOUT_MS", 1, 3_600_000) {
        settings.session.ack_timeout_ms = v;
    }

    // ── Transport settings ──────────────────────────────────────────
    if let Some(v) = read_env_u64("SOCKIO_PING_INTERVAL_MS", 100, 600_000) {
        settings.transport.ping_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SOCKIO_PING_TIMEOUT_MS", 100, 600_000) {
        settings.transport.ping_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("SOCKIO_RECEIVE_TIMEOUT_MS", 100, 3_600_000) {
        settings.transport.receive_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("SOCKIO_SEND_TIMEOUT_MS", 100, 3_600_000) {
        settings.transport.send_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("SOCKIO_MAX_MESSAGE_SIZE", 1024, 1_073_741_824) {
        settings.transport.max_message_size = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SOCKIO_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a dispatch mode name (case-insensitive).
pub fn parse_dispatch_mode(val: &str) -> Option<DispatchMode> {
    match val.to_lowercase().as_str() {
        "concurrent" => Some(DispatchMode::Concurrent),
        "serialized" | "sequential" => Some(DispatchMode::Serialized),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "session": {"queueCapacity": 500, "ackTimeoutMs": 30000}
        });
        let source = serde_json::json!({
            "session": {"queueCapacity": 64}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["session"]["queueCapacity"], 64);
        assert_eq!(merged["session"]["ackTimeoutMs"], 30000);
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        assert_eq!(
            settings.transport.ping_timeout_ms,
            SockioSettings::default().transport.ping_timeout_ms
        );
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"session": {"dispatchMode": "serialized", "maxConcurrentDispatch": 8}, "transport": {"sendTimeoutMs": 5000}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.session.dispatch_mode, DispatchMode::Serialized);
        assert_eq!(settings.session.max_concurrent_dispatch, Some(8));
        assert_eq!(settings.transport.send_timeout_ms, 5000);
        assert_eq!(settings.transport.receive_timeout_ms, 60_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"queueCapacity": 1}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn dispatch_mode_parsing() {
        assert_eq!(parse_dispatch_mode("Serialized"), Some(DispatchMode::Serialized));
        assert_eq!(parse_dispatch_mode("sequential"), Some(DispatchMode::Serialized));
        assert_eq!(parse_dispatch_mode("CONCURRENT"), Some(DispatchMode::Concurrent));
        assert_eq!(parse_dispatch_mode("parallel"), None);
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_u64_range("100", 1, 1000), Some(100));
        assert_eq!(parse_u64_range("0", 1, 1000), None);
        assert_eq!(parse_u64_range("abc", 1, 1000), None);
        assert_eq!(parse_usize_range("4", 4, 8), Some(4));
        assert_eq!(parse_usize_range("9", 4, 8), None);
    }
}
