//! Pipeline controller tests against in-process collaborators.
//!
//! The fetcher, embedder and catalog are stubs; the store is the real
//! [`InMemoryStore`], optionally wrapped to inject insert failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use feed_sync::catalog::{SourceCatalog, StaticCatalog};
use feed_sync::embedding::{DisabledProvider, Embedder};
use feed_sync::error::{CatalogReadError, EmbeddingError, FetchError, StoreError};
use feed_sync::fetch::FeedFetcher;
use feed_sync::models::{Article, Embedding, NewArticle, Source};
use feed_sync::pipeline::{Pipeline, PipelineOptions, RetryPolicy};
use feed_sync::store::{ArticleStore, InMemoryStore, StoreCounts};

// ============ Stubs ============

#[derive(Clone)]
enum Reply {
    Body(String),
    Status(u16),
    Panic,
}

/// Serves canned replies per URL. When a URL has several replies they are
/// served in order and the last one repeats.
#[derive(Default)]
struct StubFetcher {
    replies: HashMap<String, Vec<Reply>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.entry(url.to_string()).or_default().push(reply);
        self
    }

    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n - 1
        };
        let replies = self.replies.get(url).expect("unexpected fetch");
        match replies[attempt.min(replies.len() - 1)].clone() {
            Reply::Body(body) => Ok(body.into_bytes()),
            Reply::Status(status) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Reply::Panic => panic!("fetcher blew up on {}", url),
        }
    }
}

/// Records every text it is asked to embed. Fails when the text contains
/// `fail_marker`.
#[derive(Default)]
struct RecordingEmbedder {
    inputs: Mutex<Vec<String>>,
    fail_marker: Option<String>,
}

impl RecordingEmbedder {
    fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Default::default()
        }
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    fn model_name(&self) -> &str {
        "test-model"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.inputs.lock().unwrap().push(text.to_string());
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(EmbeddingError::Upstream {
                    status: 500,
                    message: "model overloaded".to_string(),
                });
            }
        }
        Ok(vec![text.chars().count() as f32, 0.5, -0.5])
    }
}

struct BrokenCatalog;

#[async_trait]
impl SourceCatalog for BrokenCatalog {
    async fn list_sources(&self) -> Result<Vec<Source>, CatalogReadError> {
        Err(CatalogReadError::new("connection refused"))
    }
}

/// Delegates to an [`InMemoryStore`] but rejects inserts for URLs
/// containing `poison`.
struct FlakyStore {
    inner: InMemoryStore,
    inserts: AtomicUsize,
}

#[async_trait]
impl ArticleStore for FlakyStore {
    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError> {
        self.inner.exists_by_url(url).await
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if article.url.contains("poison") {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.insert_article(article).await
    }

    async fn insert_embedding(
        &self,
        article_id: i64,
        model: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        self.inner.insert_embedding(article_id, model, vector).await
    }

    async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        self.inner.get_article_by_url(url).await
    }

    async fn get_embedding(&self, article_id: i64) -> Result<Option<Embedding>, StoreError> {
        self.inner.get_embedding(article_id).await
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        self.inner.counts().await
    }
}

/// A store with no URL uniqueness of its own. Inserts pause before
/// writing, so two workers that both saw a URL as new would both store it.
#[derive(Default)]
struct LooseStore {
    rows: Mutex<Vec<Article>>,
}

impl LooseStore {
    fn urls(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|a| a.url.clone()).collect()
    }
}

#[async_trait]
impl ArticleStore for LooseStore {
    async fn exists_by_url(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().unwrap().iter().any(|a| a.url == url))
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<i64, StoreError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(Article {
            id,
            source_id: article.source_id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            published_at: article.published_at,
            content: article.content.clone(),
            bias: article.bias.clone(),
            created_at: article.published_at,
        });
        Ok(id)
    }

    async fn insert_embedding(
        &self,
        _article_id: i64,
        _model: &str,
        _vector: &[f32],
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.url == url)
            .cloned())
    }

    async fn get_embedding(&self, _article_id: i64) -> Result<Option<Embedding>, StoreError> {
        Ok(None)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        Ok(StoreCounts {
            articles: self.rows.lock().unwrap().len() as i64,
            embeddings: 0,
        })
    }
}

// ============ Helpers ============

fn source(id: &str, bias: Option<&str>) -> Source {
    Source {
        id: id.to_string(),
        name: id.to_uppercase(),
        url: feed_url(id),
        bias_label: bias.map(str::to_string),
        country: None,
    }
}

fn feed_url(id: &str) -> String {
    format!("https://{}.example/rss", id)
}

/// Build an RSS 2.0 document from `(link, title, description)` triples.
fn rss(items: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title><link>https://feed.example/</link>"#,
    );
    for (link, title, description) in items {
        xml.push_str("<item>");
        if !link.is_empty() {
            xml.push_str(&format!("<link>{}</link>", link));
        }
        if !title.is_empty() {
            xml.push_str(&format!("<title>{}</title>", title));
        }
        xml.push_str(&format!(
            "<description><![CDATA[{}]]></description>",
            description
        ));
        xml.push_str("</item>");
    }
    xml.push_str("</channel></rss>");
    xml
}

fn pipeline(
    sources: Vec<Source>,
    fetcher: Arc<StubFetcher>,
    store: Arc<dyn ArticleStore>,
    embedder: Arc<dyn Embedder>,
    options: PipelineOptions,
) -> Pipeline {
    Pipeline::new(
        Arc::new(StaticCatalog::new(sources)),
        fetcher,
        store,
        embedder,
        options,
    )
}

// ============ Tests ============

#[tokio::test]
async fn test_second_run_inserts_nothing() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[
            ("https://a.example/1", "One", "first"),
            ("https://a.example/2", "Two", "second"),
        ])),
    ));
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        vec![source("a", Some("left"))],
        fetcher.clone(),
        store.clone(),
        embedder.clone(),
        PipelineOptions::default(),
    );

    let first = p.run().await.unwrap();
    assert_eq!(first.inserted(), 2);
    assert_eq!(first.failure_count(), 0);
    assert!(first
        .to_string()
        .starts_with("Sync done. Articles inserted: 2\n"));

    let second = p.run().await.unwrap();
    assert_eq!(second.inserted(), 0);
    assert_eq!(second.counts.duplicates, 2);

    let articles = store.articles();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].url, "https://a.example/1");
    assert_eq!(articles[0].bias.as_deref(), Some("left"));
    assert_eq!(articles[0].source_id.as_deref(), Some("a"));
    assert_eq!(store.counts().await.unwrap().embeddings, 2);
    assert_eq!(embedder.inputs().len(), 2);
}

#[tokio::test]
async fn test_url_is_unique_across_sources() {
    let shared = "https://wire.example/story";
    let fetcher = Arc::new(
        StubFetcher::default()
            .with(
                &feed_url("a"),
                Reply::Body(rss(&[(shared, "Story from A", "a")])),
            )
            .with(
                &feed_url("b"),
                Reply::Body(rss(&[
                    (shared, "Story from B", "b"),
                    ("https://b.example/own", "Own", "b"),
                ])),
            ),
    );
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline(
        vec![source("a", Some("left")), source("b", Some("right"))],
        fetcher,
        store.clone(),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 2);
    assert_eq!(summary.counts.duplicates, 1);

    // Sequential runs follow catalog order, so the first source wins.
    let story = store.get_article_by_url(shared).await.unwrap().unwrap();
    assert_eq!(story.title, "Story from A");
    assert_eq!(story.bias.as_deref(), Some("left"));
}

#[tokio::test]
async fn test_failing_source_does_not_stop_the_others() {
    let fetcher = Arc::new(
        StubFetcher::default()
            .with(
                &feed_url("a"),
                Reply::Body(rss(&[("https://a.example/1", "A1", "")])),
            )
            .with(&feed_url("b"), Reply::Status(500))
            .with(
                &feed_url("c"),
                Reply::Body(rss(&[("https://c.example/1", "C1", "")])),
            )
            .with(
                &feed_url("d"),
                Reply::Body(rss(&[("https://d.example/1", "D1", "")])),
            ),
    );
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline(
        vec![
            source("a", None),
            source("b", None),
            source("c", None),
            source("d", None),
        ],
        fetcher,
        store.clone(),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 3);
    assert_eq!(summary.sources_total, 4);
    assert_eq!(summary.sources_ok, 3);
    assert_eq!(summary.source_failures.len(), 1);

    let failure = &summary.source_failures[0];
    assert_eq!(failure.source_id, "b");
    assert_eq!(failure.kind, "fetch");
    assert!(failure.message.contains("HTTP 500"));

    let text = summary.to_string();
    assert!(text.starts_with("Sync done. Articles inserted: 3\n"));
    assert!(text.contains("failed source b (B)"));
    assert_eq!(store.articles().len(), 3);
}

#[tokio::test]
async fn test_unparseable_feed_is_a_parse_failure() {
    let fetcher = Arc::new(
        StubFetcher::default()
            .with(
                &feed_url("a"),
                Reply::Body("<html><body>Maintenance</body></html>".to_string()),
            )
            .with(
                &feed_url("b"),
                Reply::Body(rss(&[("https://b.example/1", "B1", "")])),
            ),
    );
    let p = pipeline(
        vec![source("a", None), source("b", None)],
        fetcher,
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 1);
    assert_eq!(summary.source_failures.len(), 1);
    assert_eq!(summary.source_failures[0].kind, "parse");
}

#[tokio::test]
async fn test_entries_without_link_or_title_are_dropped() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[
            ("", "No link", "x"),
            ("https://a.example/untitled", "", "x"),
            ("https://a.example/blank", "   ", "x"),
            ("https://a.example/ok", "Fine", "x"),
        ])),
    ));
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        store.clone(),
        embedder.clone(),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 1);
    assert_eq!(summary.counts.invalid, 3);
    assert_eq!(summary.failure_count(), 0);
    assert_eq!(store.articles().len(), 1);
    assert_eq!(embedder.inputs().len(), 1);
}

#[tokio::test]
async fn test_embedding_input_is_truncated_but_content_is_not() {
    let long_body: String = "é".repeat(5000);
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[("https://a.example/long", "Long", long_body.as_str())])),
    ));
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        store.clone(),
        embedder.clone(),
        PipelineOptions::default(),
    );

    p.run().await.unwrap();

    let inputs = embedder.inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].chars().count(), 4000);

    let article = store
        .get_article_by_url("https://a.example/long")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(article.content.chars().count(), 5000);
    let embedding = store.get_embedding(article.id).await.unwrap().unwrap();
    assert_eq!(embedding.vector[0], 4000.0);
    assert_eq!(embedding.model, "test-model");
}

#[tokio::test]
async fn test_truncation_bound_is_configurable() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[("https://a.example/1", "One", "abcdefghij")])),
    ));
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        Arc::new(InMemoryStore::new()),
        embedder.clone(),
        PipelineOptions {
            max_input_chars: 4,
            ..Default::default()
        },
    );

    p.run().await.unwrap();
    assert_eq!(embedder.inputs(), vec!["abcd".to_string()]);
}

#[tokio::test]
async fn test_embedding_failure_keeps_article_and_is_not_retried() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[
            ("https://a.example/good", "Good", "fine text"),
            ("https://a.example/bad", "Bad", "explode here"),
        ])),
    ));
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(RecordingEmbedder::failing_on("explode"));
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        store.clone(),
        embedder.clone(),
        PipelineOptions::default(),
    );

    let first = p.run().await.unwrap();
    assert_eq!(first.inserted(), 2);
    assert_eq!(first.embedding_failures.len(), 1);
    assert_eq!(first.embedding_failures[0].url, "https://a.example/bad");
    assert!(first.to_string().contains("embeddings missing: 1"));

    let bad = store
        .get_article_by_url("https://a.example/bad")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.embedding_failures[0].article_id, bad.id);
    assert!(store.get_embedding(bad.id).await.unwrap().is_none());
    assert_eq!(
        store.counts().await.unwrap(),
        StoreCounts {
            articles: 2,
            embeddings: 1
        }
    );

    // The partial article is a duplicate now; nothing re-embeds it.
    let second = p.run().await.unwrap();
    assert_eq!(second.inserted(), 0);
    assert_eq!(second.counts.duplicates, 2);
    assert!(second.embedding_failures.is_empty());
    assert_eq!(embedder.inputs().len(), 2);
}

#[tokio::test]
async fn test_insert_failure_is_isolated_to_the_entry() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[
            ("https://a.example/1", "One", ""),
            ("https://a.example/poison", "Poison", ""),
            ("https://a.example/3", "Three", ""),
        ])),
    ));
    let store = Arc::new(FlakyStore {
        inner: InMemoryStore::new(),
        inserts: AtomicUsize::new(0),
    });
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        store.clone(),
        embedder.clone(),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 2);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.sources_ok, 1);
    assert_eq!(summary.entry_failures.len(), 1);
    assert_eq!(summary.entry_failures[0].url, "https://a.example/poison");
    assert!(summary.entry_failures[0].message.contains("disk full"));

    assert_eq!(store.inserts.load(Ordering::SeqCst), 3);
    assert_eq!(store.inner.articles().len(), 2);
    // No embedding is attempted for an entry that was never stored.
    assert_eq!(embedder.inputs().len(), 2);
}

#[tokio::test]
async fn test_unreadable_catalog_fails_the_run() {
    let p = Pipeline::new(
        Arc::new(BrokenCatalog),
        Arc::new(StubFetcher::default()),
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let err = p.run().await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test]
async fn test_empty_catalog_is_a_successful_empty_run() {
    let p = pipeline(
        Vec::new(),
        Arc::new(StubFetcher::default()),
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 0);
    assert_eq!(summary.sources_total, 0);
}

#[tokio::test]
async fn test_parallel_sources_insert_shared_url_once() {
    let shared = "https://wire.example/breaking";
    let ids = ["a", "b", "c", "d"];
    let mut fetcher = StubFetcher::default();
    for id in ids {
        let own = format!("https://{}.example/own", id);
        fetcher = fetcher.with(
            &feed_url(id),
            Reply::Body(rss(&[
                (shared, "Breaking", "same story"),
                (own.as_str(), "Own", "own story"),
            ])),
        );
    }
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        ids.iter().map(|id| source(id, None)).collect(),
        Arc::new(fetcher),
        store.clone(),
        embedder.clone(),
        PipelineOptions {
            concurrency: 4,
            ..Default::default()
        },
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 5);
    assert_eq!(summary.counts.duplicates, 3);
    assert_eq!(summary.failure_count(), 0);

    let articles = store.articles();
    assert_eq!(articles.len(), 5);
    assert_eq!(articles.iter().filter(|a| a.url == shared).count(), 1);
    assert_eq!(embedder.inputs().len(), 5);
}

#[tokio::test]
async fn test_url_repeated_within_one_feed_is_inserted_once() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[
            ("https://a.example/1", "First copy", "one"),
            ("https://a.example/2", "Other", "two"),
            ("https://a.example/1", "Second copy", "one again"),
        ])),
    ));
    let store = Arc::new(LooseStore::default());
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        store.clone(),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 2);
    assert_eq!(summary.counts.duplicates, 1);
    assert_eq!(store.urls(), vec!["https://a.example/1", "https://a.example/2"]);
    let kept = store
        .get_article_by_url("https://a.example/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.title, "First copy");
}

#[tokio::test]
async fn test_parallel_dedup_does_not_rely_on_store_uniqueness() {
    let shared = "https://x.example/1";
    let ids = ["a", "b", "c"];
    let mut fetcher = StubFetcher::default();
    for id in ids {
        fetcher = fetcher.with(
            &feed_url(id),
            Reply::Body(rss(&[(shared, "Shared", "s"), (shared, "Shared again", "s")])),
        );
    }
    let store = Arc::new(LooseStore::default());
    let p = pipeline(
        ids.iter().map(|id| source(id, None)).collect(),
        Arc::new(fetcher),
        store.clone(),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions {
            concurrency: 3,
            ..Default::default()
        },
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 1);
    assert_eq!(summary.counts.duplicates, 5);
    assert_eq!(store.urls(), vec![shared]);
}

#[tokio::test]
async fn test_panicking_source_is_recorded_as_aborted() {
    for concurrency in [1, 3] {
        let fetcher = Arc::new(
            StubFetcher::default()
                .with(
                    &feed_url("a"),
                    Reply::Body(rss(&[("https://a.example/1", "A1", "")])),
                )
                .with(&feed_url("b"), Reply::Panic)
                .with(
                    &feed_url("c"),
                    Reply::Body(rss(&[("https://c.example/1", "C1", "")])),
                ),
        );
        let p = pipeline(
            vec![source("a", None), source("b", None), source("c", None)],
            fetcher,
            Arc::new(InMemoryStore::new()),
            Arc::new(RecordingEmbedder::default()),
            PipelineOptions {
                concurrency,
                ..Default::default()
            },
        );

        let summary = p.run().await.unwrap();
        assert_eq!(summary.inserted(), 2, "concurrency {}", concurrency);
        assert_eq!(summary.source_failures.len(), 1);
        assert_eq!(summary.source_failures[0].source_id, "b");
        assert_eq!(summary.source_failures[0].kind, "aborted");
    }
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let shared = "https://wire.example/story";
    let fetcher = Arc::new(
        StubFetcher::default()
            .with(
                &feed_url("a"),
                Reply::Body(rss(&[(shared, "S", ""), ("https://a.example/1", "A1", "")])),
            )
            .with(&feed_url("b"), Reply::Body(rss(&[(shared, "S", "")]))),
    );
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(RecordingEmbedder::default());
    let p = pipeline(
        vec![source("a", None), source("b", None)],
        fetcher,
        store.clone(),
        embedder.clone(),
        PipelineOptions {
            dry_run: true,
            ..Default::default()
        },
    );

    let summary = p.run().await.unwrap();
    assert!(summary.dry_run);
    assert_eq!(summary.inserted(), 2);
    assert_eq!(summary.counts.duplicates, 1);
    assert!(summary
        .to_string()
        .starts_with("Dry run done. Articles that would be inserted: 2"));

    assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
    assert!(embedder.inputs().is_empty());
}

#[tokio::test]
async fn test_disabled_embedder_stores_articles_without_vectors() {
    let fetcher = Arc::new(StubFetcher::default().with(
        &feed_url("a"),
        Reply::Body(rss(&[("https://a.example/1", "A1", "text")])),
    ));
    let store = Arc::new(InMemoryStore::new());
    let p = pipeline(
        vec![source("a", None)],
        fetcher,
        store.clone(),
        Arc::new(DisabledProvider),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 1);
    assert!(summary.embedding_failures.is_empty());
    assert_eq!(
        store.counts().await.unwrap(),
        StoreCounts {
            articles: 1,
            embeddings: 0
        }
    );
}

#[tokio::test]
async fn test_only_source_restricts_the_run() {
    let fetcher = Arc::new(
        StubFetcher::default()
            .with(
                &feed_url("a"),
                Reply::Body(rss(&[("https://a.example/1", "A1", "")])),
            )
            .with(
                &feed_url("b"),
                Reply::Body(rss(&[("https://b.example/1", "B1", "")])),
            ),
    );
    let sources = vec![source("a", None), source("b", None)];

    let p = pipeline(
        sources.clone(),
        fetcher.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions {
            only_source: Some("b".to_string()),
            ..Default::default()
        },
    );
    let summary = p.run().await.unwrap();
    assert_eq!(summary.sources_total, 1);
    assert_eq!(summary.inserted(), 1);
    assert_eq!(fetcher.calls(&feed_url("a")), 0);

    let unknown = pipeline(
        sources,
        fetcher,
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions {
            only_source: Some("zzz".to_string()),
            ..Default::default()
        },
    );
    assert!(unknown.run().await.is_err());
}

#[tokio::test]
async fn test_transient_fetch_errors_are_retried() {
    let fetcher = Arc::new(
        StubFetcher::default()
            .with(&feed_url("a"), Reply::Status(503))
            .with(
                &feed_url("a"),
                Reply::Body(rss(&[("https://a.example/1", "A1", "")])),
            )
            .with(&feed_url("b"), Reply::Status(404)),
    );
    let p = pipeline(
        vec![source("a", None), source("b", None)],
        fetcher.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions {
            fetch_retry: RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(5),
            },
            ..Default::default()
        },
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.inserted(), 1);
    assert_eq!(fetcher.calls(&feed_url("a")), 2);
    // 404 is permanent: one attempt only.
    assert_eq!(fetcher.calls(&feed_url("b")), 1);
    assert_eq!(summary.source_failures[0].source_id, "b");
}

#[tokio::test]
async fn test_no_retry_by_default() {
    let fetcher = Arc::new(StubFetcher::default().with(&feed_url("a"), Reply::Status(503)));
    let p = pipeline(
        vec![source("a", None)],
        fetcher.clone(),
        Arc::new(InMemoryStore::new()),
        Arc::new(RecordingEmbedder::default()),
        PipelineOptions::default(),
    );

    let summary = p.run().await.unwrap();
    assert_eq!(summary.source_failures.len(), 1);
    assert_eq!(fetcher.calls(&feed_url("a")), 1);
}
