//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse: the raw TOML is first read as a `toml::Value` and its key
//! tree compared against the known field names, producing warnings with
//! "did you mean?" suggestions. Serde deserialization and range checks run
//! afterwards in [`MonitorConfig::validate`](super::MonitorConfig::validate).
//! Warnings never reject a config.

use std::collections::HashSet;

/// A non-fatal config warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// Every valid dotted key path of `MonitorConfig`. Keep in sync with monitor_config.rs.
const KNOWN_CONFIG_KEYS: &[&str] = &[
    "device",
    "device.ip",
    "device.request_timeout_ms",
    "polling",
    "polling.interval_ms",
    "history",
    "history.moisture_capacity",
    "history.temperature_capacity",
    "history.humidity_capacity",
    "calibration",
    "calibration.raw_dry",
    "calibration.raw_wet",
    "demo",
    "demo.seed",
    "demo.seed_batch",
    "server",
    "server.addr",
    "settings",
    "settings.path",
];

pub fn known_config_keys() -> HashSet<&'static str> {
    KNOWN_CONFIG_KEYS.iter().copied().collect()
}

/// All dotted key paths present in a TOML document, tables included.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3. Ties go to the first listed key.
pub fn suggest_correction(unknown: &str) -> Option<String> {
    KNOWN_CONFIG_KEYS
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by_key(|&(_, dist)| dist)
        .map(|(k, _)| k.to_string())
}

/// Warnings for every key in `raw_toml` that `MonitorConfig` does not know.
///
/// Unparseable input yields no warnings; serde reports the parse error later.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}
