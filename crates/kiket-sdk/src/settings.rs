//! Extension settings
//!
//! Three layers, later wins:
//!
//! 1. manifest defaults
//! 2. `KIKET_SETTING_<UPPER_SNAKE_KEY>` environment variables
//! 3. explicitly configured settings

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Prefix of per-setting environment overrides
pub const SETTING_ENV_PREFIX: &str = "KIKET_SETTING_";

/// Merged, read-only settings visible to handlers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings(Map<String, Value>);

impl Settings {
    /// Wrap an already merged map
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Merge the three layers, reading overrides from the process environment
    pub fn merge(manifest_defaults: &Map<String, Value>, explicit: &Map<String, Value>) -> Self {
        Self::merge_with(manifest_defaults, explicit, |name| std::env::var(name).ok())
    }

    /// Merge with a custom environment lookup
    pub fn merge_with<F>(manifest_defaults: &Map<String, Value>, explicit: &Map<String, Value>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = manifest_defaults.clone();

        for (key, default) in manifest_defaults {
            let name = format!("{SETTING_ENV_PREFIX}{}", env_key(key));
            if let Some(raw) = env(&name) {
                merged.insert(key.clone(), coerce(&raw, default));
            }
        }

        for (key, value) in explicit {
            merged.insert(key.clone(), value.clone());
        }

        Self(merged)
    }

    /// Raw value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Value deserialized into `T`; `None` if absent or of the wrong shape
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0.get(key).cloned().and_then(|v| serde_json::from_value(v).ok())
    }

    /// Whether `key` is set
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over every setting
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

// Environment strings keep their type only when the default is not a string
fn coerce(raw: &str, default: &Value) -> Value {
    if default.is_string() || default.is_null() {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `maxRetries` / `max-retries` / `max.retries` -> `MAX_RETRIES`
pub(crate) fn env_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch.to_ascii_uppercase());
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out
}
