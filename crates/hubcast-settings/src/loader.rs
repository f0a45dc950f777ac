//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HubcastSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::HubcastSettings;

/// Resolve the path to the settings file (`~/.hubcast/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hubcast").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HubcastSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a failed validation is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<HubcastSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<HubcastSettings> {
    let defaults = serde_json::to_value(HubcastSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut HubcastSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse or fall out
/// of range are ignored with a warning.
pub fn apply_overrides_from<F>(settings: &mut HubcastSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("HUBCAST_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("HUBCAST_PORT", |s| parse_u64_range(s, 0, 65_535)) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.parsed("HUBCAST_MAX_CONNECTIONS", |s| {
        parse_usize_range(s, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }

    // ── Backbone ────────────────────────────────────────────────────
    if let Some(v) = env.string("REDIS_HOST") {
        settings.backbone.host = v;
    }
    if let Some(v) = env.parsed("REDIS_PORT", |s| parse_u64_range(s, 1, 65_535)) {
        settings.backbone.port = v as u16;
    }
    if let Some(v) = env.string("HUBCAST_CHANNEL") {
        settings.backbone.channel = v;
    }

    // ── Opacity ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed("MAX_VALUE", |s| parse_u64_range(s, 2, u64::MAX)) {
        settings.opacity.max_value = v;
    }
    if let Some(v) = env.parsed("MIN_ALPHA", parse_unit_f64) {
        settings.opacity.min_alpha = v;
    }
    if let Some(v) = env.parsed("MAX_ALPHA", parse_unit_f64) {
        settings.opacity.max_alpha = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("HUBCAST_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("HUBCAST_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a finite `f64` within `[0, 1]`.
pub fn parse_unit_f64(val: &str) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (0.0..=1.0).contains(&n).then_some(n)
}

/// Accept `compact` or `json` (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<String> {
    let lower = val.trim().to_ascii_lowercase();
    matches!(lower.as_str(), "compact" | "json").then_some(lower)
}

// ── Env var reader ──────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
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
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = read_layers(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, HubcastSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "opacity": {"maxAlpha": 0.7}, "logging": null}"#,
        )
        .unwrap();

        let settings = read_layers(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.max_connections, 256);
        assert!((settings.opacity.max_alpha - 0.7).abs() < f64::EPSILON);
        assert_eq!(settings.opacity.max_value, 10_000);
        assert_eq!(settings.logging.level, "info");
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
    fn load_rejects_invalid_merged_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"backbone": {"channel": ""}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = HubcastSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("HUBCAST_HOST", "127.0.0.1"),
                ("HUBCAST_PORT", "8088"),
                ("HUBCAST_MAX_CONNECTIONS", "10"),
                ("REDIS_HOST", "redis.internal"),
                ("REDIS_PORT", "6380"),
                ("HUBCAST_CHANNEL", "counts-eu"),
                ("MAX_VALUE", "5000"),
                ("MIN_ALPHA", "0.2"),
                ("MAX_ALPHA", "0.8"),
                ("HUBCAST_LOG_LEVEL", "debug"),
                ("HUBCAST_LOG_FORMAT", "JSON"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8088);
        assert_eq!(settings.server.max_connections, 10);
        assert_eq!(settings.backbone.host, "redis.internal");
        assert_eq!(settings.backbone.port, 6380);
        assert_eq!(settings.backbone.channel, "counts-eu");
        assert_eq!(settings.opacity.max_value, 5000);
        assert!((settings.opacity.min_alpha - 0.2).abs() < f64::EPSILON);
        assert!((settings.opacity.max_alpha - 0.8).abs() < f64::EPSILON);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, "json");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = HubcastSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("HUBCAST_PORT", "not-a-port"),
                ("REDIS_PORT", "0"),
                ("MAX_VALUE", "1"),
                ("MIN_ALPHA", "1.5"),
                ("HUBCAST_LOG_FORMAT", "pretty"),
                ("HUBCAST_CHANNEL", ""),
            ]),
        );
        assert_eq!(settings, HubcastSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("6379", 1, 65_535), Some(6379));
        assert_eq!(parse_u64_range("0", 1, 65_535), None);
        assert_eq!(parse_u64_range("70000", 1, 65_535), None);
        assert_eq!(parse_u64_range("abc", 1, 65_535), None);
    }

    #[test]
    fn parse_unit_f64_bounds() {
        assert_eq!(parse_unit_f64("0"), Some(0.0));
        assert_eq!(parse_unit_f64(" 1 "), Some(1.0));
        assert_eq!(parse_unit_f64("-0.1"), None);
        assert_eq!(parse_unit_f64("NaN"), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 1, 100), Some(50));
        assert_eq!(parse_usize_range("0", 1, 100), None);
    }
}
