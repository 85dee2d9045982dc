//! Storage abstraction for Feed Sync.
//!
//! The [`ArticleStore`] trait defines the operations the pipeline needs from
//! the persistence layer, enabling pluggable backends (SQLite, in-memory).
//!
//! Implementations must be `Send + Sync`: one store is shared by every
//! source worker of a run.
//!
//! # Contract
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`exists_by_url`](ArticleStore::exists_by_url) | Point lookup used by the dedup gate |
//! | [`insert_article`](ArticleStore::insert_article) | Insert a new article, rejecting known URLs |
//! | [`insert_embedding`](ArticleStore::insert_embedding) | Attach the single vector of an article |
//!
//! Article and embedding inserts are independent writes; an article may
//! exist without an embedding.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Article, Embedding, NewArticle};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Row counts, used in run output and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub articles: i64,
    pub embeddings: i64,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Whether an article with exactly this URL is stored.
    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError>;

    /// Insert an article and return its store-assigned id.
    ///
    /// Must fail with [`StoreError::Duplicate`] when the URL is already
    /// present.
    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError>;

    /// Store the embedding of an article.
    ///
    /// Fails with [`StoreError::UnknownArticle`] for a missing article and
    /// [`StoreError::EmbeddingExists`] when the article already has one.
    async fn insert_embedding(
        &self,
        article_id: i64,
        model: &str,
        vector: &[f32],
    ) -> Result<(), StoreError>;

    async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError>;

    async fn get_embedding(&self, article_id: i64) -> Result<Option<Embedding>, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;
}
