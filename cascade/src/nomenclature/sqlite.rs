//! SQLite-backed nomenclature store.
//!
//! One table per tier, named after the tier endpoint (`sections`, `chapters`,
//! `positions4`, `positions6`), each with `code`, `description` and an
//! optional `parent_code`. Prefix lookups use `LIKE 'code%'`.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{ChildQuery, Entry, Nomenclature, NomenclatureError};
use crate::node::Node;
use crate::tier::Tier;

pub struct SqliteNomenclature {
    pool: SqlitePool,
}

impl SqliteNomenclature {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a database by URL (e.g. `sqlite://hs.db`).
    pub async fn connect(url: &str) -> Result<Self, NomenclatureError> {
        let pool = SqlitePool::connect(url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the per-tier tables if missing.
    pub async fn migrate(&self) -> Result<(), NomenclatureError> {
        for tier in Tier::ALL {
            let table = tier.endpoint();
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    code TEXT PRIMARY KEY,
                    description TEXT NOT NULL DEFAULT '',
                    parent_code TEXT
                )
                "#
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_parent ON {table} (parent_code)"
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Insert or replace one row.
    pub async fn upsert(&self, tier: Tier, entry: &Entry) -> Result<(), NomenclatureError> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {} (code, description, parent_code) VALUES (?, ?, ?)",
            tier.endpoint()
        ))
        .bind(&entry.code)
        .bind(&entry.description)
        .bind(entry.parent.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn rows_to_nodes(rows: Vec<(String, String)>) -> Vec<Node> {
    rows.into_iter()
        .map(|(code, description)| Node::described(code, description))
        .collect()
}

#[async_trait]
impl Nomenclature for SqliteNomenclature {
    async fn all_nodes(&self, tier: Tier) -> Result<Vec<Node>, NomenclatureError> {
        let rows: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT code, description FROM {} ORDER BY code",
            tier.endpoint()
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows_to_nodes(rows))
    }

    async fn children_of(
        &self,
        tier: Tier,
        query: &ChildQuery,
    ) -> Result<Vec<Node>, NomenclatureError> {
        let table = tier.endpoint();
        let rows: Vec<(String, String)> = match query {
            ChildQuery::Parent(code) => {
                sqlx::query_as(&format!(
                    "SELECT code, description FROM {table} \
                     WHERE parent_code = ? OR (parent_code IS NULL AND code LIKE ?) \
                     ORDER BY code"
                ))
                .bind(code)
                .bind(query.as_like_pattern())
                .fetch_all(&self.pool)
                .await?
            }
            ChildQuery::Prefix(_) => {
                sqlx::query_as(&format!(
                    "SELECT code, description FROM {table} WHERE code LIKE ? ORDER BY code"
                ))
                .bind(query.as_like_pattern())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows_to_nodes(rows))
    }

    async fn describe(&self, tier: Tier, code: &str) -> Result<String, NomenclatureError> {
        let row: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT description FROM {} WHERE code = ?",
            tier.endpoint()
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(d,)| d).unwrap_or_default())
    }
}
