//! Core data models used throughout Feed Sync.
//!
//! These types represent the sources, feed entries, articles, and embeddings
//! that flow through the synchronization pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured feed origin, owned by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub bias_label: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// A syndication item as emitted by the feed parser, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub body: Option<String>,
}

impl RawEntry {
    /// Validate the entry and turn it into an insertable article.
    ///
    /// Returns `None` when the link or the title is missing or blank.
    /// The bias label is copied from `source` so the article does not
    /// follow later catalog edits.
    pub fn into_article(self, source: &Source, now: DateTime<Utc>) -> Option<NewArticle> {
        let url = non_blank(self.link)?;
        let title = non_blank(self.title)?;
        Some(NewArticle {
            source_id: Some(source.id.clone()),
            title,
            url,
            published_at: self.published_at.unwrap_or(now),
            content: self.body.unwrap_or_default(),
            bias: source.bias_label.clone(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A validated entry ready to be written to the article store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub source_id: Option<String>,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub bias: Option<String>,
}

/// A persisted, deduplicated article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub id: i64,
    pub source_id: Option<String>,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub bias: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The embedding vector stored for one article.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub article_id: i64,
    pub model: String,
    pub vector: Vec<f32>,
}
