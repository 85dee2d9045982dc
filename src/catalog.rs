//! Source catalog: the read-only list of feeds a run processes.
//!
//! The pipeline never writes to the catalog. Two backends exist:
//! [`StaticCatalog`] serves the `[[sources]]` entries of the config file,
//! [`SqliteCatalog`] reads the `sources` table.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::error::CatalogReadError;
use crate::models::Source;

#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// All sources, in the order they should be processed.
    async fn list_sources(&self) -> Result<Vec<Source>, CatalogReadError>;
}

/// A fixed list of sources.
pub struct StaticCatalog {
    sources: Vec<Source>,
}

impl StaticCatalog {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl SourceCatalog for StaticCatalog {
    async fn list_sources(&self) -> Result<Vec<Source>, CatalogReadError> {
        Ok(self.sources.clone())
    }
}

/// Reads the `sources` table.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceCatalog for SqliteCatalog {
    async fn list_sources(&self) -> Result<Vec<Source>, CatalogReadError> {
        let rows = sqlx::query(
            "SELECT id, name, url, bias_label, country FROM sources ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Source, CatalogReadError> {
                Ok(Source {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    bias_label: row.try_get("bias_label")?,
                    country: row.try_get("country")?,
                })
            })
            .collect()
    }
}

/// Build the catalog selected by `[catalog].kind`.
pub fn from_config(config: &Config, pool: &SqlitePool) -> Result<Arc<dyn SourceCatalog>> {
    match config.catalog.kind.as_str() {
        "config" => Ok(Arc::new(StaticCatalog::new(config.sources.clone()))),
        "database" => Ok(Arc::new(SqliteCatalog::new(pool.clone()))),
        other => anyhow::bail!("Unknown catalog kind: '{}'", other),
    }
}
