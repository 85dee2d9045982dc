//! SQLite-backed [`ArticleStore`] implementation.
//!
//! Timestamps are stored as Unix seconds. Vectors are stored as
//! little-endian `f32` BLOBs (see [`vec_to_blob`]). The `UNIQUE(url)`
//! constraint backs the dedup gate: a conflicting insert surfaces as
//! [`StoreError::Duplicate`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::StoreError;
use crate::models::{Article, Embedding, NewArticle};

use super::{ArticleStore, StoreCounts};

/// SQLite implementation of the [`ArticleStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_article(row: &SqliteRow) -> Result<Article, sqlx::Error> {
    Ok(Article {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        published_at: from_ts(row.try_get("published_at")?),
        content: row.try_get("content")?,
        bias: row.try_get("bias")?,
        created_at: from_ts(row.try_get("created_at")?),
    })
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (source_id, title, url, published_at, content, bias, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.source_id)
        .bind(&article.title)
        .bind(&article.url)
        .bind(article.published_at.timestamp())
        .bind(&article.content)
        .bind(&article.bias)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    url: article.url.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_embedding(
        &self,
        article_id: i64,
        model: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO embeddings (article_id, model, dims, vector, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(article_id)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::EmbeddingExists { article_id })
            }
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::UnknownArticle { article_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, source_id, title, url, published_at, content, bias, created_at
            FROM articles WHERE url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_article).transpose()?)
    }

    async fn get_embedding(&self, article_id: i64) -> Result<Option<Embedding>, StoreError> {
        let row = sqlx::query("SELECT model, vector FROM embeddings WHERE article_id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let blob: Vec<u8> = row.try_get("vector")?;
                Ok(Some(Embedding {
                    article_id,
                    model: row.try_get("model")?,
                    vector: blob_to_vec(&blob),
                }))
            }
            None => Ok(None),
        }
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreCounts {
            articles,
            embeddings,
        })
    }
}
