//! Scoring-service keys.
//!
//! A key is wrapped in [`SecretString`] the moment it is read. `Debug` and
//! `Display` never show it; [`ServiceKey::expose`] is called only where the
//! request is signed.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use super::ProviderError;

/// Where a key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    Settings,
    Environment,
    Explicit,
}

impl fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyOrigin::Settings => "provider settings",
            KeyOrigin::Environment => "environment",
            KeyOrigin::Explicit => "caller",
        })
    }
}

pub struct ServiceKey {
    secret: SecretString,
    origin: KeyOrigin,
}

impl ServiceKey {
    pub fn explicit(value: impl Into<String>) -> Self {
        Self::with_origin(value.into(), KeyOrigin::Explicit)
    }

    fn with_origin(value: String, origin: KeyOrigin) -> Self {
        Self {
            secret: SecretString::from(value),
            origin,
        }
    }

    /// `settings[field]`, then `env_var`. Blank values count as missing.
    pub fn lookup(settings: &JsonValue, field: &str, env_var: &str) -> Result<Self, ProviderError> {
        if let Some(value) = non_blank(settings.get(field).and_then(JsonValue::as_str)) {
            return Ok(Self::with_origin(value.to_string(), KeyOrigin::Settings));
        }
        match std::env::var(env_var) {
            Ok(value) if non_blank(Some(&value)).is_some() => Ok(Self::with_origin(value, KeyOrigin::Environment)),
            _ => Err(ProviderError::NotConfigured(format!(
                "no service key: set '{}' in provider settings or the {} environment variable",
                field, env_var
            ))),
        }
    }

    /// Whether [`lookup`](Self::lookup) would succeed.
    pub fn is_resolvable(settings: &JsonValue, field: &str, env_var: &str) -> bool {
        non_blank(settings.get(field).and_then(JsonValue::as_str)).is_some()
            || std::env::var(env_var).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("origin", &self.origin)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service key from {} [REDACTED]", self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_never_formatted() {
        let secret = "sk-docscore-0123456789";
        let key = ServiceKey::explicit(secret);

        assert!(!format!("{:?}", key).contains(secret));
        assert!(!format!("{}", key).contains(secret));
        assert!(format!("{}", key).contains("caller"));
        assert_eq!(key.expose(), secret);
    }

    #[test]
    fn test_settings_win_over_environment() {
        std::env::set_var("DOCSCORE_TEST_KEY_SETTINGS", "from-env");
        let key = ServiceKey::lookup(&json!({"api_key": "from-settings"}), "api_key", "DOCSCORE_TEST_KEY_SETTINGS")
            .unwrap();
        assert_eq!(key.expose(), "from-settings");
        assert_eq!(key.origin(), KeyOrigin::Settings);
        std::env::remove_var("DOCSCORE_TEST_KEY_SETTINGS");
    }

    #[test]
    fn test_blank_setting_falls_through_to_environment() {
        std::env::set_var("DOCSCORE_TEST_KEY_BLANK", "from-env");
        let key = ServiceKey::lookup(&json!({"api_key": "  "}), "api_key", "DOCSCORE_TEST_KEY_BLANK").unwrap();
        assert_eq!(key.origin(), KeyOrigin::Environment);
        std::env::remove_var("DOCSCORE_TEST_KEY_BLANK");
    }

    #[test]
    fn test_missing_key_names_both_places() {
        let err = ServiceKey::lookup(&json!({}), "api_key", "DOCSCORE_TEST_KEY_ABSENT").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("api_key"));
        assert!(msg.contains("DOCSCORE_TEST_KEY_ABSENT"));
        assert!(!ServiceKey::is_resolvable(&json!({}), "api_key", "DOCSCORE_TEST_KEY_ABSENT"));
    }
}
