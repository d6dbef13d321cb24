//! Tariff Agent
//!
//! Wires the cascade library to a real oracle: an OpenAI-compatible chat
//! completions endpoint, a nomenclature loaded from disk or SQLite, and a
//! batch runner for spreadsheets of articles.

pub mod batch;
pub mod config;
pub mod nomenclature;
pub mod oracle;
pub mod prompts;
pub mod telemetry;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tariff_cascade::CascadeOrchestrator;

pub use batch::{BatchClassifier, BatchError, BatchSummary, RowOutcome, Sheet};
pub use config::{AgentConfig, BatchConfig, NomenclatureSource, OracleEndpoint};
pub use oracle::LlmOracle;

/// Open the configured nomenclature and put an `LlmOracle` in front of it.
pub async fn build_orchestrator(config: &AgentConfig) -> Result<Arc<CascadeOrchestrator>> {
    config.validate().map_err(|e| anyhow!("invalid configuration: {e}"))?;
    let store = nomenclature::open(&config.nomenclature).await?;
    let oracle = LlmOracle::new(config.oracle.clone())
        .context("Failed to build oracle client")?
        .with_nomenclature(store.clone());
    let orchestrator = CascadeOrchestrator::new(store, Arc::new(oracle), config.cascade.clone())
        .context("Failed to build cascade orchestrator")?;
    Ok(Arc::new(orchestrator))
}
