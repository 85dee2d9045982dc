//! Synchronization pipeline orchestration.
//!
//! Coordinates one run: catalog → fetch → parse → dedup → insert → embed.
//!
//! # State machines
//!
//! Each source moves through
//!
//! ```text
//! Pending → Fetching → Parsing → ProcessingEntries → Done
//!              │          │
//!              └──────────┴──▶ Failed(source)
//! ```
//!
//! and each entry of a source that reached `ProcessingEntries` through
//!
//! ```text
//! Candidate → Validated → DedupChecked → Inserted → EmbeddingComputed → Persisted
//!     │                        │            │
//!     ▼                        ▼            └──▶ embedding failure (article kept)
//!  Invalid                 Duplicate
//! ```
//!
//! with `Failed(entry)` reachable from any step after `Validated`.
//!
//! # Failure containment
//!
//! Only [`CatalogReadError`] fails a run. Fetch and parse errors end the
//! source, store errors end the entry, embedding errors leave the article
//! without a vector. Every one of them is logged and recorded in the
//! [`RunSummary`].
//!
//! # Concurrency
//!
//! With `concurrency = 1` sources run one after the other in catalog order.
//! Larger values run up to that many sources at once; the [`DedupGate`]
//! keeps check-then-insert atomic per URL. Each source runs in its own task,
//! so a panic is recorded against that source and the others continue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::{self, SourceCatalog};
use crate::config::Config;
use crate::db;
use crate::dedup::DedupGate;
use crate::embedding::{self, truncate_chars, DisabledProvider, Embedder};
use crate::error::{CatalogReadError, EmbeddingError, FetchError, SourceError, StoreError};
use crate::feed::parse_feed;
use crate::fetch::{FeedFetcher, HttpFetcher};
use crate::migrate;
use crate::models::{RawEntry, Source};
use crate::report::{EmbeddingFailure, EntryFailure, RunSummary, SourceFailure, SourceReport};
use crate::store::{ArticleStore, SqliteStore};

/// Stage a source was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStage {
    Fetching,
    Parsing,
}

/// Result of the embedding step for an inserted article.
#[derive(Debug)]
pub enum EmbeddingStatus {
    Stored,
    /// The provider is disabled; the step was not run.
    Skipped,
    Failed(EmbeddingError),
}

/// Terminal state of one entry.
#[derive(Debug)]
pub enum EntryOutcome {
    /// Missing link or title; dropped before the dedup check.
    Invalid,
    /// URL already stored.
    Duplicate,
    /// Dry run: the entry is new and would have been inserted.
    WouldInsert,
    Inserted {
        article_id: i64,
        embedding: EmbeddingStatus,
    },
    /// Dedup lookup or insert failed; nothing was written.
    Failed(StoreError),
}

/// Bounded retry with exponential backoff, applied to transient fetch errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Character bound for text submitted to the embedder.
    pub max_input_chars: usize,
    /// Sources processed at once.
    pub concurrency: usize,
    pub fetch_retry: RetryPolicy,
    /// Fetch, parse and dedup, but write nothing.
    pub dry_run: bool,
    /// Restrict the run to the catalog entry with this id.
    pub only_source: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_input_chars: 4000,
            concurrency: 1,
            fetch_retry: RetryPolicy::none(),
            dry_run: false,
            only_source: None,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_input_chars: config.embedding.max_input_chars,
            concurrency: config.pipeline.concurrency,
            fetch_retry: RetryPolicy {
                max_retries: config.fetch.max_retries,
                base_delay: Duration::from_secs(1),
            },
            dry_run: false,
            only_source: None,
        }
    }
}

/// The pipeline controller. Holds its collaborators explicitly; cloning is
/// cheap and shares them.
#[derive(Clone)]
pub struct Pipeline {
    catalog: Arc<dyn SourceCatalog>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn ArticleStore>,
    embedder: Arc<dyn Embedder>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn SourceCatalog>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn ArticleStore>,
        embedder: Arc<dyn Embedder>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            catalog,
            fetcher,
            store,
            embedder,
            options,
        }
    }

    /// Construct every collaborator from configuration: SQLite store,
    /// catalog, HTTP fetcher and embedding provider.
    ///
    /// The schema is created if missing, dry run or not, so the dedup
    /// lookups have a table to read. A dry run never embeds, so it gets the
    /// disabled provider and needs no API key.
    pub async fn from_config(config: &Config, options: PipelineOptions) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::create_schema(&pool).await?;

        let catalog = catalog::from_config(config, &pool)?;
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let embedder: Arc<dyn Embedder> = if options.dry_run {
            Arc::new(DisabledProvider)
        } else {
            embedding::create_provider(&config.embedding)?
        };
        let store = Arc::new(SqliteStore::new(pool));

        Ok(Self::new(catalog, fetcher, store, embedder, options))
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Run the pipeline once over the whole catalog.
    ///
    /// Fails only when the catalog cannot be read. Every other failure is
    /// contained and reported in the returned summary.
    pub async fn run(&self) -> Result<RunSummary, CatalogReadError> {
        let run_id = Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(run_id.clone(), self.options.dry_run);

        let mut sources = self.catalog.list_sources().await.map_err(|e| {
            warn!(run_id = %run_id, error = %e, "cannot read source catalog");
            e
        })?;

        if let Some(only) = &self.options.only_source {
            sources.retain(|s| &s.id == only);
            if sources.is_empty() {
                return Err(CatalogReadError::new(format!(
                    "no source with id '{}' in catalog",
                    only
                )));
            }
        }

        info!(
            run_id = %run_id,
            sources = sources.len(),
            concurrency = self.options.concurrency,
            dry_run = self.options.dry_run,
            "sync started"
        );

        let gate = Arc::new(DedupGate::new(self.store.clone()));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        if self.options.concurrency <= 1 {
            for source in sources {
                let handle = self.spawn_source(source.clone(), gate.clone(), semaphore.clone());
                summary.absorb(join_source(&source, handle.await));
            }
        } else {
            let handles: Vec<_> = sources
                .into_iter()
                .map(|source| {
                    let handle =
                        self.spawn_source(source.clone(), gate.clone(), semaphore.clone());
                    (source, handle)
                })
                .collect();
            for (source, handle) in handles {
                summary.absorb(join_source(&source, handle.await));
            }
        }

        summary.finish();
        info!(
            run_id = %run_id,
            inserted = summary.counts.inserted,
            duplicates = summary.counts.duplicates,
            invalid = summary.counts.invalid,
            failures = summary.failure_count(),
            "sync finished"
        );
        Ok(summary)
    }

    fn spawn_source(
        &self,
        source: Source,
        gate: Arc<DedupGate>,
        semaphore: Arc<Semaphore>,
    ) -> tokio::task::JoinHandle<SourceReport> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if it is.
            let _permit = semaphore.acquire_owned().await.ok();
            pipeline.process_source(&source, &gate).await
        })
    }

    /// Drive one source through its state machine.
    #[instrument(skip_all, fields(source = %source.id))]
    pub async fn process_source(&self, source: &Source, gate: &DedupGate) -> SourceReport {
        let mut report = SourceReport::default();

        debug!(url = %source.url, "fetching");
        let raw = match self.fetch_with_retry(&source.url).await {
            Ok(raw) => raw,
            Err(e) => {
                return self.fail_source(report, source, SourceStage::Fetching, e.into());
            }
        };

        let entries = match parse_feed(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                return self.fail_source(report, source, SourceStage::Parsing, e.into());
            }
        };
        debug!(entries = entries.len(), "parsed feed");

        for entry in entries {
            let url = entry.link.clone().unwrap_or_default();
            match self.process_entry(source, entry, gate).await {
                EntryOutcome::Invalid => report.counts.invalid += 1,
                EntryOutcome::Duplicate => report.counts.duplicates += 1,
                EntryOutcome::WouldInsert => report.counts.inserted += 1,
                EntryOutcome::Inserted {
                    article_id,
                    embedding,
                } => {
                    report.counts.inserted += 1;
                    if let EmbeddingStatus::Failed(e) = embedding {
                        warn!(article_id, url = %url, error = %e, "article stored without embedding");
                        report.embedding_failures.push(EmbeddingFailure {
                            source_id: source.id.clone(),
                            article_id,
                            url: url.trim().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
                EntryOutcome::Failed(e) => {
                    warn!(url = %url, error = %e, "entry failed");
                    report.counts.failed += 1;
                    report.entry_failures.push(EntryFailure {
                        source_id: source.id.clone(),
                        url: url.trim().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            inserted = report.counts.inserted,
            duplicates = report.counts.duplicates,
            invalid = report.counts.invalid,
            "source done"
        );
        report
    }

    fn fail_source(
        &self,
        mut report: SourceReport,
        source: &Source,
        stage: SourceStage,
        err: SourceError,
    ) -> SourceReport {
        warn!(stage = ?stage, error = %err, "source failed");
        report.failure = Some(source_failure(source, &err));
        report
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let policy = self.options.fetch_retry;
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_transient() && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.delay(attempt);
                    debug!(attempt, ?delay, error = %e, "retrying fetch");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drive one entry through its state machine.
    pub async fn process_entry(
        &self,
        source: &Source,
        entry: RawEntry,
        gate: &DedupGate,
    ) -> EntryOutcome {
        // Candidate → Validated
        let Some(article) = entry.into_article(source, Utc::now()) else {
            return EntryOutcome::Invalid;
        };

        // Validated → DedupChecked → Inserted, atomic per URL
        let claim = gate.claim(&article.url).await;
        match gate.is_known(&article.url).await {
            Ok(true) => return EntryOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => return EntryOutcome::Failed(e),
        }

        if self.options.dry_run {
            gate.stage(&article.url);
            return EntryOutcome::WouldInsert;
        }

        let article_id = match self.store.insert_article(&article).await {
            Ok(id) => id,
            Err(StoreError::Duplicate { .. }) => return EntryOutcome::Duplicate,
            Err(e) => return EntryOutcome::Failed(e),
        };
        drop(claim);
        debug!(article_id, url = %article.url, "article inserted");

        // Inserted → EmbeddingComputed → Persisted
        if !self.embedder.is_enabled() {
            return EntryOutcome::Inserted {
                article_id,
                embedding: EmbeddingStatus::Skipped,
            };
        }

        let text = truncate_chars(&article.content, self.options.max_input_chars);
        let embedding = match self.embed_and_store(article_id, text).await {
            Ok(()) => EmbeddingStatus::Stored,
            Err(e) => EmbeddingStatus::Failed(e),
        };

        EntryOutcome::Inserted {
            article_id,
            embedding,
        }
    }

    async fn embed_and_store(&self, article_id: i64, text: &str) -> Result<(), EmbeddingError> {
        let vector = self.embedder.embed(text).await?;
        self.store
            .insert_embedding(article_id, self.embedder.model_name(), &vector)
            .await?;
        Ok(())
    }
}

fn source_failure(source: &Source, err: &SourceError) -> SourceFailure {
    SourceFailure {
        source_id: source.id.clone(),
        source_name: source.name.clone(),
        kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

/// Turn a finished (or panicked) source task into its report.
fn join_source(
    source: &Source,
    joined: Result<SourceReport, tokio::task::JoinError>,
) -> SourceReport {
    match joined {
        Ok(report) => report,
        Err(e) => {
            let err = SourceError::Aborted(e.to_string());
            warn!(source = %source.id, error = %err, "source worker aborted");
            SourceReport {
                failure: Some(source_failure(source, &err)),
                ..Default::default()
            }
        }
    }
}
