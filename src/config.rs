use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::retry::RetryPolicy;

/// Application-level constants
pub const APP_NAME: &str = "DischargePlanner";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Placeholder value shipped in `.env` templates; treated as "not configured".
const API_KEY_PLACEHOLDER: &str = "your-openai-api-key-here";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Low temperature for medical accuracy.
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "discharge_planner=info,warn"
}

/// Get the application data directory (~/DischargePlanner/).
/// Falls back to the current directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Location of the SQLite database backing the reference store.
pub fn database_path() -> PathBuf {
    app_data_dir().join("discharge.db")
}

/// Settings for the external generative text service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Build from environment variables, keeping defaults for anything unset
    /// or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            ..Self::default()
        };
        if let Some(url) = lookup("DISCHARGE_LLM_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("DISCHARGE_LLM_MODEL") {
            config.model = model;
        }
        if let Some(secs) = lookup("DISCHARGE_LLM_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.timeout_secs = secs;
        }
        if let Some(retries) = lookup("DISCHARGE_LLM_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            config.retry.max_retries = retries;
        }
        config
    }

    /// Check that the service can actually be called.
    pub fn validate(&self) -> Result<(), String> {
        match self.api_key.as_deref() {
            None => Err("OPENAI_API_KEY not configured".into()),
            Some(API_KEY_PLACEHOLDER) => Err("OPENAI_API_KEY still holds the template placeholder".into()),
            Some(_) => Ok(()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn database_path_under_app_data() {
        assert!(database_path().starts_with(app_data_dir()));
    }

    #[test]
    fn defaults_match_reference_service() {
        let config = ServiceConfig::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 4000);
        assert!((config.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("DISCHARGE_LLM_BASE_URL", "http://localhost:8080/v1/"),
            ("DISCHARGE_LLM_MODEL", "gpt-4o-mini"),
            ("DISCHARGE_LLM_TIMEOUT_SECS", "30"),
            ("DISCHARGE_LLM_MAX_RETRIES", "4"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.retry.max_retries, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unparseable_values_keep_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("DISCHARGE_LLM_TIMEOUT_SECS", "soon"),
            ("DISCHARGE_LLM_MAX_RETRIES", "-1"),
        ]));
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn missing_or_placeholder_key_fails_validation() {
        assert!(ServiceConfig::default().validate().is_err());
        let config = ServiceConfig::from_lookup(lookup_from(&[(
            "OPENAI_API_KEY",
            "your-openai-api-key-here",
        )]));
        assert!(config.validate().is_err());
        let blank = ServiceConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "   ")]));
        assert!(blank.api_key.is_none());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
