//! Tariff Cascade Library
//!
//! Classifies a free-text query against a four-tier nomenclature (Top, Group,
//! Subgroup, Leaf; in the Harmonized System: sections, chapters, headings and
//! subheadings) by walking down the tree one tier at a time. At each tier a
//! generative classification oracle picks the relevant codes out of a bounded
//! grounding set built from the previous tier's answer.
//!
//! # Modules
//!
//! | Module          | Purpose                                                    |
//! |-----------------|------------------------------------------------------------|
//! | `tier`          | The four tiers, their labels and entry-point names         |
//! | `node`          | Code + optional description value type                     |
//! | `nomenclature`  | Read-only per-tier store trait, in-memory and SQLite stores |
//! | `oracle`        | Classification oracle trait and its hard-failure errors    |
//! | `grounding`     | Per-tier plan table and grounding set builder              |
//! | `retry`         | Bounded retry-on-empty controller                          |
//! | `orchestrator`  | The cascade loop                                           |
//! | `errors`        | `CascadeError` and the external failure kinds              |
//! | `config`        | Search flags and orchestrator configuration                |
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tariff_cascade::{CascadeConfig, CascadeOrchestrator, InMemoryNomenclature, Tier};
//!
//! let store = Arc::new(InMemoryNomenclature::from_path("hs.json")?);
//! let orchestrator = CascadeOrchestrator::new(store, oracle, CascadeConfig::from_env())?;
//! let result = orchestrator.classify("frozen boneless beef", Tier::Leaf).await?;
//! ```

pub mod config;
pub mod errors;
pub mod grounding;
pub mod node;
pub mod nomenclature;
pub mod oracle;
pub mod orchestrator;
pub mod retry;
pub mod tier;

pub use config::{CascadeConfig, SearchConfig};
pub use errors::{CascadeError, FailureKind};
pub use grounding::{GroundingSetBuilder, GroundingSource, TierPlan, TIER_PLAN};
pub use node::Node;
pub use nomenclature::{
    Catalogue, ChildQuery, Entry, InMemoryNomenclature, Nomenclature, NomenclatureError,
};
pub use oracle::{ClassificationOracle, OracleError};
pub use orchestrator::{CascadeOrchestrator, Classification, ClassifyRequest, TierTrace};
pub use retry::{RetryOutcome, RetryPolicy};
pub use tier::{ParseTierError, Tier};

#[cfg(feature = "sqlite")]
pub use nomenclature::SqliteNomenclature;
