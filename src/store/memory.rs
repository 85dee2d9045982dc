//! In-memory [`ArticleStore`] implementation, used by tests.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. The URL index enforces the
//! same uniqueness rule as the SQLite `UNIQUE(url)` constraint.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::models::{Article, Embedding, NewArticle};

use super::{ArticleStore, StoreCounts};

#[derive(Default)]
struct Tables {
    next_id: i64,
    articles: HashMap<i64, Article>,
    by_url: HashMap<String, i64>,
    embeddings: HashMap<i64, Embedding>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    /// All stored articles ordered by id.
    pub fn articles(&self) -> Vec<Article> {
        let Ok(tables) = self.read() else {
            return Vec::new();
        };
        let mut articles: Vec<Article> = tables.articles.values().cloned().collect();
        articles.sort_by_key(|a| a.id);
        articles
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.by_url.contains_key(url))
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError> {
        let mut tables = self.write()?;
        if tables.by_url.contains_key(&article.url) {
            return Err(StoreError::Duplicate {
                url: article.url.clone(),
            });
        }
        tables.next_id += 1;
        let id = tables.next_id;
        tables.by_url.insert(article.url.clone(), id);
        tables.articles.insert(
            id,
            Article {
                id,
                source_id: article.source_id.clone(),
                title: article.title.clone(),
                url: article.url.clone(),
                published_at: article.published_at,
                content: article.content.clone(),
                bias: article.bias.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn insert_embedding(
        &self,
        article_id: i64,
        model: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if !tables.articles.contains_key(&article_id) {
            return Err(StoreError::UnknownArticle { article_id });
        }
        if tables.embeddings.contains_key(&article_id) {
            return Err(StoreError::EmbeddingExists { article_id });
        }
        tables.embeddings.insert(
            article_id,
            Embedding {
                article_id,
                model: model.to_string(),
                vector: vector.to_vec(),
            },
        );
        Ok(())
    }

    async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .by_url
            .get(url)
            .and_then(|id| tables.articles.get(id))
            .cloned())
    }

    async fn get_embedding(&self, article_id: i64) -> Result<Option<Embedding>, StoreError> {
        Ok(self.read()?.embeddings.get(&article_id).cloned())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let tables = self.read()?;
        Ok(StoreCounts {
            articles: tables.articles.len() as i64,
            embeddings: tables.embeddings.len() as i64,
        })
    }
}
