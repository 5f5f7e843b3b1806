//! Layered settings loading.
//!
//! Compiled defaults, then the JSON file, then `PCFORGE_*` environment
//! variables, then validation. When layering the file over the defaults,
//! objects merge key by key, any other value replaces what it overlays, and
//! `null` leaves the default in place.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::PcforgeSettings;

/// `~/.pcforge/settings.json`, falling back to `/tmp` without `HOME`.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".pcforge")
        .join("settings.json")
}

/// Load from [`settings_path`] with process environment overrides.
pub fn load_settings() -> Result<PcforgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with process environment overrides.
///
/// A missing file yields defaults. Unreadable or malformed files and values
/// that fail [`PcforgeSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<PcforgeSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load from `path`, resolving environment overrides through `lookup`.
pub fn load_with_env(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PcforgeSettings> {
    let mut layered = serde_json::to_value(PcforgeSettings::default())?;
    match read_file(path)? {
        Some(file) => {
            debug!(path = %path.display(), "applying settings file");
            layered = deep_merge(layered, file);
        }
        None => debug!(path = %path.display(), "no settings file"),
    }

    let mut settings: PcforgeSettings = serde_json::from_value(layered)?;
    apply_env_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

fn read_file(path: &Path) -> Result<Option<Value>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_owned(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SettingsError::Syntax {
            path: path.to_owned(),
            source,
        })
}

/// Overlay `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `PCFORGE_*` overrides.
///
/// Numbers must parse and fall inside the listed bounds. Invalid values are
/// logged and skipped; empty strings count as unset.
pub fn apply_env_overrides(settings: &mut PcforgeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = Env(lookup);
    let client = &mut settings.client;
    env.text("PCFORGE_URL", &mut client.url);
    env.text("PCFORGE_HEALTH_URL", &mut client.health_url);
    env.number("PCFORGE_OPEN_TIMEOUT_MS", 100..=300_000, &mut client.open_timeout_ms);
    env.number(
        "PCFORGE_HEARTBEAT_TIMEOUT_MS",
        1_000..=3_600_000,
        &mut client.heartbeat_timeout_ms,
    );
    env.number(
        "PCFORGE_PROBE_INTERVAL_MS",
        1_000..=86_400_000,
        &mut client.probe_interval_ms,
    );
    env.number("PCFORGE_PROBE_TIMEOUT_MS", 100..=60_000, &mut client.probe_timeout_ms);
    env.number(
        "PCFORGE_QUERY_TIMEOUT_MS",
        1_000..=3_600_000,
        &mut client.query_timeout_ms,
    );
    env.number("PCFORGE_MAX_QUERY_CHARS", 1..=100_000, &mut client.max_query_chars);

    let retry = &mut settings.retry;
    env.number("PCFORGE_MAX_ATTEMPTS", 0..=100, &mut retry.max_attempts);
    env.number("PCFORGE_BASE_DELAY_MS", 1..=600_000, &mut retry.base_delay_ms);
    env.number("PCFORGE_MAX_DELAY_MS", 1..=3_600_000, &mut retry.max_delay_ms);

    env.text("PCFORGE_LOG_LEVEL", &mut settings.logging.level);
    env.flag("PCFORGE_LOG_JSON", &mut settings.logging.json);
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    const TRUE: [&str; 4] = ["true", "1", "yes", "on"];
    const FALSE: [&str; 4] = ["false", "0", "no", "off"];
    if TRUE.iter().any(|t| val.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE.iter().any(|f| val.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number and require it to fall inside `bounds`.
pub fn parse_bounded<T>(val: &str, bounds: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| bounds.contains(n))
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn text(&self, name: &str, slot: &mut String) {
        if let Some(v) = self.raw(name) {
            *slot = v;
        }
    }

    fn flag(&self, name: &str, slot: &mut bool) {
        if let Some(v) = self.raw(name) {
            match parse_bool(&v) {
                Some(b) => *slot = b,
                None => warn!(key = name, value = %v, "expected a boolean, ignoring"),
            }
        }
    }

    fn number<T>(&self, name: &str, bounds: RangeInclusive<T>, slot: &mut T)
    where
        T: FromStr + PartialOrd + std::fmt::Display,
    {
        if let Some(v) = self.raw(name) {
            match parse_bounded(&v, &bounds) {
                Some(n) => *slot = n,
                None => warn!(
                    key = name,
                    value = %v,
                    min = %bounds.start(),
                    max = %bounds.end(),
                    "out of range or not a number, ignoring"
                ),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
