//! Opens the configured nomenclature store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tariff_cascade::{InMemoryNomenclature, Nomenclature, Tier};
use tracing::info;

use crate::config::NomenclatureSource;

pub async fn open(source: &NomenclatureSource) -> Result<Arc<dyn Nomenclature>> {
    match source {
        NomenclatureSource::Catalogue { path } => {
            let store = InMemoryNomenclature::from_path(path)
                .with_context(|| format!("Failed to load catalogue {}", path.display()))?;
            Ok(Arc::new(store))
        }
        NomenclatureSource::Tables {
            sections,
            chapters,
            positions4,
            positions6,
        } => {
            let mut store = InMemoryNomenclature::new();
            for (tier, path) in [
                (Tier::Top, sections),
                (Tier::Group, chapters),
                (Tier::Subgroup, positions4),
                (Tier::Leaf, positions6),
            ] {
                store.load_table(tier, path).with_context(|| {
                    format!("Failed to load {} table {}", tier.label(), path.display())
                })?;
            }
            log_sizes(&store);
            Ok(Arc::new(store))
        }
        NomenclatureSource::Sqlite { url } => open_sqlite(url).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(url: &str) -> Result<Arc<dyn Nomenclature>> {
    let store = tariff_cascade::SqliteNomenclature::connect(url)
        .await
        .with_context(|| format!("Failed to open nomenclature database {url}"))?;
    info!(%url, "nomenclature database opened");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(url: &str) -> Result<Arc<dyn Nomenclature>> {
    anyhow::bail!("{url}: SQLite nomenclature requires the `sqlite` feature")
}

fn log_sizes(store: &InMemoryNomenclature) {
    info!(
        sections = store.len(Tier::Top),
        chapters = store.len(Tier::Group),
        positions4 = store.len(Tier::Subgroup),
        positions6 = store.len(Tier::Leaf),
        "nomenclature loaded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn opens_catalogue_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hs.json");
        std::fs::write(
            &path,
            r#"{"sections": [{"code": "I", "description": "Live animals"}],
                "chapters": [{"code": "01", "description": "Live animals", "parent": "I"}]}"#,
        )
        .unwrap();

        let store = open(&NomenclatureSource::Catalogue { path }).await.unwrap();
        assert_eq!(store.describe(Tier::Group, "01").await.unwrap(), "Live animals");
    }

    #[tokio::test]
    async fn opens_per_tier_tables() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            path
        };
        let source = NomenclatureSource::Tables {
            sections: write("sections.tsv", "code\tdescription\nI\tLive animals\n"),
            chapters: write("chapters.tsv", "code\tdescription\tparent\n01\tLive animals\tI\n"),
            positions4: write("positions4.csv", "code,description\n0102,Live bovine animals\n"),
            positions6: write("positions6.csv", "code,description\n010221,Breeding cattle\n"),
        };

        let store = open(&source).await.unwrap();
        assert_eq!(store.all_nodes(Tier::Leaf).await.unwrap().len(), 1);
        assert_eq!(store.describe(Tier::Top, "I").await.unwrap(), "Live animals");
    }

    #[tokio::test]
    async fn missing_catalogue_is_error() {
        let source = NomenclatureSource::Catalogue {
            path: PathBuf::from("/nonexistent/hs.json"),
        };
        assert!(open(&source).await.is_err());
    }
}
