//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TesseraSettings::default()`]
//! 2. If `~/.tessera/settings.json` exists, deep-merge its values over defaults
//! 3. Apply `TESSERA_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TesseraSettings;

/// Resolve the path to the settings file (`~/.tessera/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tessera").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TesseraSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an unusable value is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<TesseraSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Read and merge the settings file without consulting the environment.
pub fn read_settings_file(path: &Path) -> Result<TesseraSettings> {
    let defaults = serde_json::to_value(TesseraSettings::default())
        .map_err(|e| SettingsError::json(path, e))?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::io(path, e))?;
        let user: Value =
            serde_json::from_str(&content).map_err(|e| SettingsError::json(path, e))?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(|e| SettingsError::json(path, e))
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and
/// nulls in `source` keep the `target` value.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TESSERA_*` overrides using `lookup` to read variables.
///
/// Out-of-range or unparsable values are logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut TesseraSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("TESSERA_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = read("TESSERA_POOL_SIZE") {
        match parse_u32_range(&v, 1, 64) {
            Some(n) => settings.store.pool_size = n,
            None => warn!(key = "TESSERA_POOL_SIZE", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = read("TESSERA_BUSY_TIMEOUT_MS") {
        match parse_u64_range(&v, 0, 600_000) {
            Some(n) => settings.store.busy_timeout_ms = n,
            None => warn!(key = "TESSERA_BUSY_TIMEOUT_MS", value = %v, "invalid env var, ignoring"),
        }
    }
    if let Some(v) = read("TESSERA_CONNECTION_TIMEOUT_MS") {
        match parse_u64_range(&v, 100, 600_000) {
            Some(n) => settings.store.connection_timeout_ms = n,
            None => warn!(
                key = "TESSERA_CONNECTION_TIMEOUT_MS",
                value = %v,
                "invalid env var, ignoring"
            ),
        }
    }
    if let Some(v) = read("TESSERA_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a string as a `u32` within an inclusive range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
