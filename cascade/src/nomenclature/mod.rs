//! Nomenclature Access
//!
//! Read-only, per-tier view of the classification tree. The cascade only ever
//! asks three questions of a store:
//!
//! | Call                         | Used for                                   |
//! |------------------------------|--------------------------------------------|
//! | `all_nodes(tier)`            | Top grounding set, empty-parent fallback   |
//! | `children_of(tier, query)`   | Grounding sets below Top                   |
//! | `describe(tier, code)`       | Description enrichment of accepted nodes   |
//!
//! Stores are trusted to uphold the parent → child relation; the cascade does
//! not re-check it.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::node::Node;
use crate::tier::Tier;

pub use memory::{Catalogue, Entry, InMemoryNomenclature};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteNomenclature;

/// Errors from nomenclature lookups. All of them abort the cascade.
#[derive(Debug, Error)]
pub enum NomenclatureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No table configured for tier {0}")]
    UnknownTier(Tier),

    #[error("Nomenclature unavailable: {0}")]
    Unavailable(String),
}

/// How children of an accepted parent are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildQuery {
    /// Nodes explicitly linked to this parent code. Sections are Roman
    /// numerals, so chapters hang off them by reference rather than by prefix.
    Parent(String),
    /// Nodes whose code starts with this code (`code%`).
    Prefix(String),
}

impl ChildQuery {
    /// The code the query is anchored on.
    pub fn code(&self) -> &str {
        match self {
            Self::Parent(code) | Self::Prefix(code) => code,
        }
    }

    /// SQL `LIKE` pattern for prefix lookups.
    pub fn as_like_pattern(&self) -> String {
        format!("{}%", self.code())
    }
}

/// Per-tier read-only accessors over the nomenclature tree.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Nomenclature: Send + Sync {
    /// Every node of `tier`. Order is not significant.
    async fn all_nodes(&self, tier: Tier) -> Result<Vec<Node>, NomenclatureError>;

    /// Nodes of `tier` that descend from the parent named by `query`.
    async fn children_of(
        &self,
        tier: Tier,
        query: &ChildQuery,
    ) -> Result<Vec<Node>, NomenclatureError>;

    /// Description of `code` at `tier`; empty when the code is unknown.
    async fn describe(&self, tier: Tier, code: &str) -> Result<String, NomenclatureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_appends_wildcard() {
        assert_eq!(ChildQuery::Prefix("0101".into()).as_like_pattern(), "0101%");
        assert_eq!(ChildQuery::Parent("I".into()).code(), "I");
    }
}
