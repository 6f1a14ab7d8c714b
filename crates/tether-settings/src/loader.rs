//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `TETHER_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LogFormat, MAX_TOKEN_TTL_SECS, TetherSettings};

/// Settings plus the environment overrides that were present but unusable.
///
/// Loading happens before the log subscriber exists, so the ignored
/// overrides are handed back for the caller to report once logging is up.
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    /// Validated settings.
    pub settings: TetherSettings,
    /// Overrides that failed to parse and were skipped.
    pub ignored: Vec<IgnoredOverride>,
}

/// An environment variable whose value could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredOverride {
    /// Variable name, e.g. `TETHER_PORT`.
    pub key: &'static str,
    /// Raw value as found in the environment.
    pub value: String,
}

impl IgnoredOverride {
    /// Emit the warning for this override.
    pub fn log(&self) {
        warn!(key = self.key, value = %self.value, "invalid env var, ignoring");
    }
}

/// Root directory for tether state (`~/.tether`).
pub fn tether_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether")
}

/// Resolve the default settings file path (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    tether_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`TetherSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TetherSettings = serde_json::from_value(merged)?;
    let ignored = apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(LoadedSettings { settings, ignored })
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

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut TetherSettings) -> Vec<IgnoredOverride> {
    apply_overrides_from(settings, |name| std::env::var(name).ok())
}

/// Apply overrides read through `lookup`.
///
/// Invalid values keep the file/default value and are returned so the
/// caller can warn about them. Empty strings count as unset.
pub fn apply_overrides_from<F>(settings: &mut TetherSettings, lookup: F) -> Vec<IgnoredOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let mut ignored = Vec::new();
    let mut ignore = |key: &'static str, value: String| {
        ignored.push(IgnoredOverride { key, value });
    };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("TETHER_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("TETHER_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => ignore("TETHER_PORT", v),
        }
    }
    if let Some(v) = read("TETHER_CORS_ORIGIN") {
        settings.server.cors_origin = Some(v);
    }
    if let Some(v) = read("TETHER_STATIC_DIR") {
        settings.server.static_dir = Some(v);
    }
    if let Some(v) = read("TETHER_CLOSE_REASON_ON_REJECT") {
        match parse_bool(&v) {
            Some(b) => settings.server.close_reason_on_reject = b,
            None => ignore("TETHER_CLOSE_REASON_ON_REJECT", v),
        }
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = read("TETHER_JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
    if let Some(v) = read("TETHER_TOKEN_TTL_SECS") {
        match parse_u64_range(&v, 1, MAX_TOKEN_TTL_SECS) {
            Some(ttl) => settings.auth.token_ttl_secs = ttl,
            None => ignore("TETHER_TOKEN_TTL_SECS", v),
        }
    }

    // ── Database ────────────────────────────────────────────────────
    if let Some(v) = read("TETHER_DB_PATH") {
        settings.database.path = PathBuf::from(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read("TETHER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("TETHER_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(fmt) => settings.logging.format = fmt,
            None => ignore("TETHER_LOG_FORMAT", v),
        }
    }

    ignored
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

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
        let target = serde_json::json!({"server": {"port": 3074, "host": "0.0.0.0"}});
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
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json"))
            .unwrap()
            .settings;
        assert_eq!(settings.auth.token_ttl_secs, 3600);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"server":{{"corsOrigin":"http://10.0.0.5:8204"}},"auth":{{"tokenTtlSecs":120}}}}"#
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap().settings;
        assert_eq!(settings.server.cors_origin.as_deref(), Some("http://10.0.0.5:8204"));
        assert_eq!(settings.auth.token_ttl_secs, 120);
        assert_eq!(settings.server.static_port, 8204);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn invalid_value_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"auth":{"tokenTtlSecs":0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = TetherSettings::default();
        let ignored = apply_overrides_from(
            &mut settings,
            env(&[
                ("TETHER_PORT", "4000"),
                ("TETHER_HOST", "127.0.0.1"),
                ("TETHER_JWT_SECRET", "s3cret"),
                ("TETHER_TOKEN_TTL_SECS", "60"),
                ("TETHER_DB_PATH", "/var/lib/tether/db.sqlite"),
                ("TETHER_LOG_FORMAT", "pretty"),
                ("TETHER_CLOSE_REASON_ON_REJECT", "yes"),
            ]),
        );
        assert!(ignored.is_empty());
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(settings.auth.token_ttl_secs, 60);
        assert_eq!(
            settings.database.path,
            PathBuf::from("/var/lib/tether/db.sqlite")
        );
        assert_eq!(settings.logging.format, LogFormat::Pretty);
        assert!(settings.server.close_reason_on_reject);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = TetherSettings::default();
        let ignored = apply_overrides_from(
            &mut settings,
            env(&[
                ("TETHER_PORT", "0"),
                ("TETHER_TOKEN_TTL_SECS", "soon"),
                ("TETHER_LOG_FORMAT", "xml"),
            ]),
        );
        assert_eq!(settings.server.port, 3074);
        assert_eq!(settings.auth.token_ttl_secs, 3600);
        assert_eq!(settings.logging.format, LogFormat::Json);

        let keys: Vec<&str> = ignored.iter().map(|o| o.key).collect();
        assert_eq!(
            keys,
            ["TETHER_PORT", "TETHER_TOKEN_TTL_SECS", "TETHER_LOG_FORMAT"]
        );
        assert_eq!(ignored[0].value, "0");
    }

    #[test]
    fn ttl_override_above_cap_is_reported() {
        let mut settings = TetherSettings::default();
        let ignored = apply_overrides_from(
            &mut settings,
            env(&[("TETHER_TOKEN_TTL_SECS", "9000000000000")]),
        );
        assert_eq!(settings.auth.token_ttl_secs, 3600);
        assert_eq!(
            ignored,
            vec![IgnoredOverride {
                key: "TETHER_TOKEN_TTL_SECS",
                value: "9000000000000".into(),
            }]
        );
    }

    #[test]
    fn empty_env_values_count_as_unset() {
        let mut settings = TetherSettings::default();
        let ignored = apply_overrides_from(&mut settings, env(&[("TETHER_JWT_SECRET", "")]));
        assert!(ignored.is_empty());
        assert!(settings.auth.jwt_secret.is_none());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 10, 20), None);
    }
}
