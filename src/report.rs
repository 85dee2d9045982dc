//! Run summaries and failure records.
//!
//! A [`RunSummary`] is the only output of a run: the inserted count plus
//! every source, entry and embedding failure, so "nothing new" can be told
//! apart from "every source failed".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-source entry tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntryCounts {
    /// Articles written to the store (or that would be, in a dry run).
    pub inserted: u64,
    /// Entries whose URL was already known.
    pub duplicates: u64,
    /// Entries dropped for a missing link or title.
    pub invalid: u64,
    /// Entries whose dedup check or insert failed.
    pub failed: u64,
}

impl EntryCounts {
    fn add(&mut self, other: &EntryCounts) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.invalid += other.invalid;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub source_name: String,
    /// `fetch`, `parse` or `aborted`.
    pub kind: String,
    pub message: String,
}

/// An entry that was not inserted because the store failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub source_id: String,
    pub url: String,
    pub message: String,
}

/// An article that was inserted but has no embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingFailure {
    pub source_id: String,
    pub article_id: i64,
    pub url: String,
    pub message: String,
}

/// Everything one source contributed to a run.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub counts: EntryCounts,
    pub failure: Option<SourceFailure>,
    pub entry_failures: Vec<EntryFailure>,
    pub embedding_failures: Vec<EmbeddingFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources_total: u64,
    pub sources_ok: u64,
    #[serde(flatten)]
    pub counts: EntryCounts,
    pub source_failures: Vec<SourceFailure>,
    pub entry_failures: Vec<EntryFailure>,
    pub embedding_failures: Vec<EmbeddingFailure>,
}

impl RunSummary {
    pub fn new(run_id: String, dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            dry_run,
            started_at: now,
            finished_at: now,
            sources_total: 0,
            sources_ok: 0,
            counts: EntryCounts::default(),
            source_failures: Vec::new(),
            entry_failures: Vec::new(),
            embedding_failures: Vec::new(),
        }
    }

    /// Number of articles inserted during the run.
    pub fn inserted(&self) -> u64 {
        self.counts.inserted
    }

    /// Fold one source's report into the run totals.
    pub fn absorb(&mut self, report: SourceReport) {
        self.sources_total += 1;
        self.counts.add(&report.counts);
        match report.failure {
            Some(failure) => self.source_failures.push(failure),
            None => self.sources_ok += 1,
        }
        self.entry_failures.extend(report.entry_failures);
        self.embedding_failures.extend(report.embedding_failures);
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn failure_count(&self) -> usize {
        self.source_failures.len() + self.entry_failures.len() + self.embedding_failures.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(
                f,
                "Dry run done. Articles that would be inserted: {}",
                self.counts.inserted
            )?;
        } else {
            writeln!(f, "Sync done. Articles inserted: {}", self.counts.inserted)?;
        }
        writeln!(
            f,
            "  sources: {} ok, {} failed, {} total",
            self.sources_ok,
            self.source_failures.len(),
            self.sources_total
        )?;
        writeln!(f, "  duplicates skipped: {}", self.counts.duplicates)?;
        writeln!(f, "  invalid entries dropped: {}", self.counts.invalid)?;
        if !self.dry_run {
            writeln!(
                f,
                "  embeddings missing: {}",
                self.embedding_failures.len()
            )?;
        }
        for failure in &self.source_failures {
            writeln!(
                f,
                "  failed source {} ({}): {}",
                failure.source_id, failure.source_name, failure.message
            )?;
        }
        for failure in &self.entry_failures {
            writeln!(
                f,
                "  failed entry {} [{}]: {}",
                failure.url, failure.source_id, failure.message
            )?;
        }
        for failure in &self.embedding_failures {
            writeln!(
                f,
                "  no embedding for article {} ({}): {}",
                failure.article_id, failure.url, failure.message
            )?;
        }
        Ok(())
    }
}
