//! In-memory nomenclature store.
//!
//! Loaded once (from a JSON/TOML catalogue or per-tier TSV/CSV tables) and
//! read-only afterwards, so a single instance behind an `Arc` can serve any
//! number of concurrent searches.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChildQuery, Nomenclature, NomenclatureError};
use crate::node::Node;
use crate::tier::Tier;

/// One stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub code: String,
    #[serde(default)]
    pub description: String,
    /// Explicit parent code, for tiers not linked to their parent by prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Entry {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    fn matches(&self, query: &ChildQuery) -> bool {
        match (query, &self.parent) {
            (ChildQuery::Parent(code), Some(parent)) => parent == code,
            (ChildQuery::Parent(code), None) | (ChildQuery::Prefix(code), _) => {
                self.code.starts_with(code.as_str())
            }
        }
    }
}

/// Whole-tree catalogue file layout, keyed by tier endpoint name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalogue {
    #[serde(default)]
    pub sections: Vec<Entry>,
    #[serde(default)]
    pub chapters: Vec<Entry>,
    #[serde(default)]
    pub positions4: Vec<Entry>,
    #[serde(default)]
    pub positions6: Vec<Entry>,
}

#[derive(Debug, Default, Clone)]
struct TierTable {
    entries: Vec<Entry>,
    by_code: HashMap<String, usize>,
}

impl TierTable {
    fn push(&mut self, entry: Entry) {
        match self.by_code.get(&entry.code) {
            Some(&idx) => self.entries[idx] = entry,
            None => {
                self.by_code.insert(entry.code.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

/// Nomenclature held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryNomenclature {
    tables: [TierTable; 4],
}

impl InMemoryNomenclature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace, by code) an entry at `tier`.
    pub fn insert(&mut self, tier: Tier, entry: Entry) {
        self.tables[tier.index()].push(entry);
    }

    /// Builder-style `insert`.
    pub fn with(mut self, tier: Tier, entry: Entry) -> Self {
        self.insert(tier, entry);
        self
    }

    pub fn from_catalogue(catalogue: Catalogue) -> Self {
        let mut store = Self::new();
        let tiers = [
            (Tier::Top, catalogue.sections),
            (Tier::Group, catalogue.chapters),
            (Tier::Subgroup, catalogue.positions4),
            (Tier::Leaf, catalogue.positions6),
        ];
        for (tier, entries) in tiers {
            for entry in entries {
                store.insert(tier, entry);
            }
        }
        store
    }

    /// Load a catalogue file; `.json` and `.toml` are supported.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NomenclatureError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let catalogue: Catalogue = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&raw)
                .map_err(|e| NomenclatureError::Parse(format!("{}: {e}", path.display())))?,
            Some("toml") => toml::from_str(&raw)
                .map_err(|e| NomenclatureError::Parse(format!("{}: {e}", path.display())))?,
            other => {
                return Err(NomenclatureError::Parse(format!(
                    "unsupported catalogue format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };
        let store = Self::from_catalogue(catalogue);
        tracing::info!(
            path = %path.display(),
            sections = store.len(Tier::Top),
            chapters = store.len(Tier::Group),
            positions4 = store.len(Tier::Subgroup),
            positions6 = store.len(Tier::Leaf),
            "nomenclature catalogue loaded"
        );
        Ok(store)
    }

    /// Load one tier from a delimited table with a `code`, `description`
    /// and optional `parent` header. Tab-delimited for `.tsv`, comma otherwise.
    pub fn load_table(
        &mut self,
        tier: Tier,
        path: impl AsRef<Path>,
    ) -> Result<usize, NomenclatureError> {
        let path = path.as_ref();
        let delimiter = if extension(path).as_deref() == Some("tsv") {
            b'\t'
        } else {
            b','
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| NomenclatureError::Parse(format!("{}: {e}", path.display())))?;

        let headers: csv::StringRecord = reader
            .headers()
            .map_err(|e| NomenclatureError::Parse(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        reader.set_headers(headers);

        let mut loaded = 0;
        for row in reader.deserialize::<Entry>() {
            let mut entry = row.map_err(|e| NomenclatureError::Parse(e.to_string()))?;
            entry.code = entry.code.trim().to_string();
            if entry.code.is_empty() {
                continue;
            }
            self.insert(tier, entry);
            loaded += 1;
        }
        tracing::debug!(%tier, loaded, path = %path.display(), "nomenclature table loaded");
        Ok(loaded)
    }

    /// Number of entries stored for `tier`.
    pub fn len(&self, tier: Tier) -> usize {
        self.tables[tier.index()].entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.entries.is_empty())
    }

    fn table(&self, tier: Tier) -> &TierTable {
        &self.tables[tier.index()]
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn to_node(entry: &Entry) -> Node {
    Node::described(entry.code.clone(), entry.description.clone())
}

#[async_trait]
impl Nomenclature for InMemoryNomenclature {
    async fn all_nodes(&self, tier: Tier) -> Result<Vec<Node>, NomenclatureError> {
        Ok(self.table(tier).entries.iter().map(to_node).collect())
    }

    async fn children_of(
        &self,
        tier: Tier,
        query: &ChildQuery,
    ) -> Result<Vec<Node>, NomenclatureError> {
        Ok(self
            .table(tier)
            .entries
            .iter()
            .filter(|e| e.matches(query))
            .map(to_node)
            .collect())
    }

    async fn describe(&self, tier: Tier, code: &str) -> Result<String, NomenclatureError> {
        let table = self.table(tier);
        Ok(table
            .by_code
            .get(code)
            .map(|&idx| table.entries[idx].description.clone())
            .unwrap_or_default())
    }
}
