//! Search configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Per-request override (`ClassifyRequest::with_search`)
//! 2. Environment variables (`CascadeConfig::from_env`)
//! 3. Values deserialized from a config file
//! 4. Built-in defaults

use std::env;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

const ENV_WITH_DESCRIPTION: &str = "CASCADE_WITH_DESCRIPTION";
const ENV_WITH_CASCADE: &str = "CASCADE_WITH_CASCADE";
const ENV_MAX_ATTEMPTS: &str = "CASCADE_MAX_ATTEMPTS";
const ENV_DEDUP_GROUNDING: &str = "CASCADE_DEDUP_GROUNDING";

/// Default parallel child lookups while building one grounding set.
const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 8;

/// Flags shaping the response of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Attach descriptions to returned nodes.
    pub with_description: bool,
    /// Return every traversed tier's accepted nodes, not only the deepest.
    pub with_cascade: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            with_description: true,
            with_cascade: true,
        }
    }
}

/// Configuration of a `CascadeOrchestrator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub search: SearchConfig,
    pub retry: RetryPolicy,
    /// Keep only the first occurrence of each code in a grounding set.
    pub dedup_grounding: bool,
    /// Upper bound on concurrent `children_of` lookups per tier.
    pub max_concurrent_lookups: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            retry: RetryPolicy::default(),
            dedup_grounding: false,
            max_concurrent_lookups: DEFAULT_MAX_CONCURRENT_LOOKUPS,
        }
    }
}

impl CascadeConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `CASCADE_*` environment overrides on top of `self`.
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_bool(ENV_WITH_DESCRIPTION) {
            self.search.with_description = v;
        }
        if let Some(v) = env_bool(ENV_WITH_CASCADE) {
            self.search.with_cascade = v;
        }
        if let Some(v) = env_bool(ENV_DEDUP_GROUNDING) {
            self.dedup_grounding = v;
        }
        if let Ok(raw) = env::var(ENV_MAX_ATTEMPTS) {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.retry.max_attempts = n,
                Err(_) => tracing::warn!(var = ENV_MAX_ATTEMPTS, value = %raw, "ignoring invalid value"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()?;
        if self.max_concurrent_lookups == 0 {
            return Err("max_concurrent_lookups must be > 0".to_string());
        }
        Ok(())
    }
}

fn env_bool(var: &str) -> Option<bool> {
    let raw = env::var(var).ok()?;
    match parse_bool(&raw) {
        Some(v) => Some(v),
        None => {
            tracing::warn!(var, value = %raw, "ignoring invalid boolean");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = CascadeConfig::default();
        cfg.validate().expect("default config should be valid");
        assert_eq!(cfg.retry.max_attempts, 2);
        assert!(cfg.search.with_description);
        assert!(cfg.search.with_cascade);
        assert!(!cfg.dedup_grounding);
    }

    #[test]
    fn zero_lookups_rejected() {
        let cfg = CascadeConfig {
            max_concurrent_lookups: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_boolean_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: CascadeConfig = toml::from_str(
            r#"
            dedup_grounding = true
            [search]
            with_cascade = false
            "#,
        )
        .unwrap();
        assert!(cfg.dedup_grounding);
        assert!(!cfg.search.with_cascade);
        assert!(cfg.search.with_description);
        assert_eq!(cfg.retry.max_attempts, 2);
    }
}
