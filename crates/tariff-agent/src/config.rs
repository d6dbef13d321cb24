//! Agent configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`TARIFF_*`, `CASCADE_*`)
//! 2. Values from the TOML file passed with `--config`
//! 3. Built-in defaults (local OpenAI-compatible server, `data/hs.json`)
//!
//! ```toml
//! [oracle]
//! base_url = "http://localhost:8080/v1"
//! model = "qwen2.5-14b-instruct"
//! timeout_secs = 60
//!
//! [nomenclature]
//! kind = "catalogue"
//! path = "data/hs.json"
//!
//! [cascade.search]
//! with_cascade = true
//! with_description = true
//!
//! [batch]
//! batch_size = 5
//! pause_secs = 61
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tariff_cascade::CascadeConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_MODEL: &str = "qwen2.5-14b-instruct";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DATA_PATH: &str = "data/hs.json";
/// Rows classified concurrently per batch.
const DEFAULT_BATCH_SIZE: usize = 5;
/// Pause between batches; keeps a rate-limited endpoint under its per-minute quota.
const DEFAULT_PAUSE_SECS: u64 = 61;

const ENV_ORACLE_URL: &str = "TARIFF_ORACLE_URL";
const ENV_ORACLE_MODEL: &str = "TARIFF_ORACLE_MODEL";
const ENV_ORACLE_API_KEY: &str = "TARIFF_ORACLE_API_KEY";
const ENV_ORACLE_TIMEOUT_SECS: &str = "TARIFF_ORACLE_TIMEOUT_SECS";
const ENV_DATA: &str = "TARIFF_DATA";

/// OpenAI-compatible chat completions endpoint backing the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleEndpoint {
    /// Base URL up to and including `/v1`.
    pub base_url: String,
    pub model: String,
    /// Bearer token; local servers usually accept none.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for OracleEndpoint {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature: 0.0,
        }
    }
}

impl OracleEndpoint {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{base_url}/{path}` without doubled slashes.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Where the nomenclature tree is loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NomenclatureSource {
    /// One JSON or TOML file holding all four tiers.
    Catalogue { path: PathBuf },
    /// One TSV/CSV table per tier.
    Tables {
        sections: PathBuf,
        chapters: PathBuf,
        positions4: PathBuf,
        positions6: PathBuf,
    },
    /// SQLite database (needs the `sqlite` feature).
    Sqlite { url: String },
}

impl Default for NomenclatureSource {
    fn default() -> Self {
        Self::Catalogue {
            path: PathBuf::from(DEFAULT_DATA_PATH),
        }
    }
}

impl NomenclatureSource {
    /// Interpret a `TARIFF_DATA` value: `sqlite:` URLs and `.db`/`.sqlite`
    /// files open a database, anything else is a catalogue file.
    pub fn from_location(location: &str) -> Self {
        if location.starts_with("sqlite:") {
            return Self::Sqlite {
                url: location.to_string(),
            };
        }
        let path = PathBuf::from(location);
        match path.extension().and_then(|e| e.to_str()) {
            Some("db" | "sqlite" | "sqlite3") => Self::Sqlite {
                url: format!("sqlite://{location}"),
            },
            _ => Self::Catalogue { path },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub pause_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pause_secs: DEFAULT_PAUSE_SECS,
        }
    }
}

impl BatchConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub oracle: OracleEndpoint,
    pub nomenclature: NomenclatureSource,
    pub cascade: CascadeConfig,
    pub batch: BatchConfig,
}

impl AgentConfig {
    /// Defaults, overlaid by `path` if given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var(ENV_ORACLE_URL) {
            self.oracle.base_url = url;
        }
        if let Ok(model) = env::var(ENV_ORACLE_MODEL) {
            self.oracle.model = model;
        }
        if let Ok(key) = env::var(ENV_ORACLE_API_KEY) {
            self.oracle.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Ok(raw) = env::var(ENV_ORACLE_TIMEOUT_SECS) {
            match raw.parse() {
                Ok(secs) => self.oracle.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {ENV_ORACLE_TIMEOUT_SECS}"),
            }
        }
        if let Ok(location) = env::var(ENV_DATA) {
            self.nomenclature = NomenclatureSource::from_location(&location);
        }
        self.cascade = self.cascade.with_env_overrides();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.oracle.base_url.trim().is_empty() {
            return Err("oracle.base_url must not be empty".into());
        }
        if !self.oracle.base_url.starts_with("http://")
            && !self.oracle.base_url.starts_with("https://")
        {
            return Err(format!(
                "oracle.base_url must be an http(s) URL, got {}",
                self.oracle.base_url
            ));
        }
        if self.oracle.model.trim().is_empty() {
            return Err("oracle.model must not be empty".into());
        }
        if self.oracle.timeout_secs == 0 {
            return Err("oracle.timeout_secs must be at least 1".into());
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(format!(
                "oracle.temperature must be within 0.0..=2.0, got {}",
                self.oracle.temperature
            ));
        }
        if self.batch.batch_size == 0 {
            return Err("batch.batch_size must be at least 1".into());
        }
        self.cascade.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch.batch_size, 5);
        assert_eq!(config.batch.pause(), Duration::from_secs(61));
        assert_eq!(
            config.nomenclature,
            NomenclatureSource::Catalogue {
                path: PathBuf::from("data/hs.json")
            }
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [oracle]
            model = "llama-3.1-8b"

            [nomenclature]
            kind = "sqlite"
            url = "sqlite://hs.db"

            [cascade.search]
            with_cascade = false
            "#,
        )
        .unwrap();
        assert_eq!(config.oracle.model, "llama-3.1-8b");
        assert_eq!(config.oracle.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            config.nomenclature,
            NomenclatureSource::Sqlite {
                url: "sqlite://hs.db".into()
            }
        );
        assert!(!config.cascade.search.with_cascade);
        assert!(config.cascade.search.with_description);
    }

    #[test]
    fn tables_source_parses() {
        let config: AgentConfig = toml::from_str(
            r#"
            [nomenclature]
            kind = "tables"
            sections = "sections.tsv"
            chapters = "chapters.tsv"
            positions4 = "positions4.tsv"
            positions6 = "positions6.tsv"
            "#,
        )
        .unwrap();
        assert!(matches!(config.nomenclature, NomenclatureSource::Tables { .. }));
    }

    #[test]
    fn data_location_detection() {
        assert!(matches!(
            NomenclatureSource::from_location("sqlite::memory:"),
            NomenclatureSource::Sqlite { .. }
        ));
        assert_eq!(
            NomenclatureSource::from_location("hs.db"),
            NomenclatureSource::Sqlite {
                url: "sqlite://hs.db".into()
            }
        );
        assert!(matches!(
            NomenclatureSource::from_location("hs.toml"),
            NomenclatureSource::Catalogue { .. }
        ));
    }

    #[test]
    fn endpoint_url_join() {
        let endpoint = OracleEndpoint {
            base_url: "http://host:8080/v1/".into(),
            ..Default::default()
        };
        assert_eq!(
            endpoint.url("/chat/completions"),
            "http://host:8080/v1/chat/completions"
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = AgentConfig::default();
        config.oracle.base_url = "localhost:8080".into();
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.oracle.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.cascade.max_concurrent_lookups = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[batch]\nbatch_size = 3\npause_secs = 0\n").unwrap();

        let config = AgentConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.batch.batch_size, 3);
        assert_eq!(config.batch.pause_secs, 0);
    }

    #[test]
    fn missing_file_is_error() {
        assert!(AgentConfig::from_toml_file(Path::new("/nonexistent/agent.toml")).is_err());
    }
}
