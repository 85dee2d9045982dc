//! The dedup gate: the single decision point for "is this URL new?".
//!
//! Every entry is checked with a point lookup against the store right before
//! its insert, never against a set loaded at the start of the run. When
//! sources are processed in parallel, [`DedupGate::claim`] serialises the
//! check-then-insert sequence per URL so two workers holding the same link
//! cannot both see it as new. The store's own unique constraint remains as a
//! second line of defence.
//!
//! A gate lives for one run; its claim table is dropped with it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::store::ArticleStore;

/// Exclusive right to decide and insert one URL. Released on drop.
pub struct UrlClaim {
    _guard: OwnedMutexGuard<()>,
}

pub struct DedupGate {
    store: Arc<dyn ArticleStore>,
    claims: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// URLs accepted during a dry run, which writes nothing to the store.
    staged: Mutex<HashSet<String>>,
}

impl DedupGate {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self {
            store,
            claims: Mutex::new(HashMap::new()),
            staged: Mutex::new(HashSet::new()),
        }
    }

    /// Wait until no other worker is deciding `url`, then hold it.
    pub async fn claim(&self, url: &str) -> UrlClaim {
        let lock = {
            let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
            claims
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        UrlClaim {
            _guard: lock.lock_owned().await,
        }
    }

    /// Whether `url` is already known, either stored or staged by a dry run.
    pub async fn is_known(&self, url: &str) -> Result<bool, StoreError> {
        let staged = self
            .staged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url);
        if staged {
            return Ok(true);
        }
        self.store.exists_by_url(url).await
    }

    /// Record a URL a dry run would have inserted.
    pub fn stage(&self, url: &str) {
        self.staged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string());
    }
}
