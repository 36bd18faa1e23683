//! Secret lookup for handlers
//!
//! Secrets delivered in the payload's `secrets` object take priority; the
//! process environment is the fallback, first under the exact key and then
//! under its `UPPER_SNAKE_CASE` form.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{SdkError, SdkResult};
use crate::handler::Payload;
use crate::settings::env_key;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Per-request secret resolver
#[derive(Clone)]
pub struct SecretResolver {
    payload_secrets: HashMap<String, SecretString>,
    env: EnvLookup,
}

impl fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.payload_secrets.keys().collect();
        keys.sort();
        f.debug_struct("SecretResolver").field("payload_keys", &keys).finish_non_exhaustive()
    }
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl SecretResolver {
    /// Resolver over explicit secrets with process environment fallback
    pub fn new(payload_secrets: HashMap<String, SecretString>) -> Self {
        Self {
            payload_secrets,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }

    /// Collect the string entries of the payload's `secrets` object
    pub fn from_payload(payload: &Payload) -> Self {
        let secrets = payload
            .get("secrets")
            .and_then(Value::as_object)
            .map(|secrets| {
                secrets
                    .iter()
                    .filter_map(|(key, value)| {
                        let value = value.as_str()?;
                        Some((key.clone(), SecretString::new(value.to_string())))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self::new(secrets)
    }

    /// Replace the environment lookup
    #[must_use]
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    /// Resolve `key`; empty values count as missing
    pub fn get(&self, key: &str) -> Option<SecretString> {
        if let Some(secret) = self.payload_secrets.get(key)
            && !secret.expose_secret().is_empty()
        {
            return Some(secret.clone());
        }

        let upper = env_key(key);
        [key, upper.as_str()]
            .into_iter()
            .filter_map(|name| (self.env)(name))
            .find(|value| !value.is_empty())
            .map(SecretString::new)
    }

    /// Resolve `key` or fail
    ///
    /// # Errors
    ///
    /// [`SdkError::MissingSecret`] if no source has a non-empty value.
    pub fn require(&self, key: &str) -> SdkResult<SecretString> {
        self.get(key).ok_or_else(|| SdkError::MissingSecret(key.to_string()))
    }

    /// Whether `key` resolves
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> + Send + Sync {
        move |name| pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_payload_wins_over_environment() {
        let resolver = SecretResolver::from_payload(&payload(json!({"secrets": {"apiKey": "from-payload"}})))
            .with_env(env(&[("apiKey", "from-env"), ("API_KEY", "from-env-upper")]));

        assert_eq!(resolver.get("apiKey").unwrap().expose_secret(), "from-payload");
    }

    #[test]
    fn test_environment_exact_then_upper_snake() {
        let resolver = SecretResolver::default().with_env(env(&[("API_KEY", "upper")]));
        assert_eq!(resolver.get("apiKey").unwrap().expose_secret(), "upper");

        let resolver = SecretResolver::default().with_env(env(&[("apiKey", "exact"), ("API_KEY", "upper")]));
        assert_eq!(resolver.get("apiKey").unwrap().expose_secret(), "exact");
    }

    #[test]
    fn test_empty_values_fall_through() {
        let resolver = SecretResolver::from_payload(&payload(json!({"secrets": {"token": "", "n": 5}})))
            .with_env(env(&[("token", ""), ("TOKEN", "env")]));

        assert_eq!(resolver.get("token").unwrap().expose_secret(), "env");
        assert!(resolver.get("n").is_none());
    }

    #[test]
    fn test_require_missing() {
        let resolver = SecretResolver::default().with_env(env(&[]));
        assert!(matches!(resolver.require("nope"), Err(SdkError::MissingSecret(key)) if key == "nope"));
        assert!(!resolver.contains("nope"));
    }
}
