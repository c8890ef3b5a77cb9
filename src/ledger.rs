//! Persisted set of post ids that have already been archived.
//!
//! The whole set lives in one JSON array blob. It is read once per
//! extraction pass and rewritten once after the pass, so a crash in between
//! means the next run may archive some posts again (at-least-once).

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info};

use crate::archive::pretty_json;
use crate::constants::LEDGER_KEY;
use crate::error::{recover, PipelineError};
use crate::s3::ObjectStore;

/// Ids of posts already archived.
pub type PostIds = HashSet<String>;

/// Dedup ledger backed by an object store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl Ledger {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            key: LEDGER_KEY.to_string(),
        }
    }

    /// Object key of the ledger blob.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the archived id set, failing open.
    ///
    /// A missing blob is the first-run case and yields an empty set; any
    /// other failure is logged and also yields an empty set.
    pub async fn load(&self) -> PostIds {
        // Ledger errors never propagate, so the fallback is always taken.
        recover(self.try_load().await, "load post id ledger", PostIds::new)
            .unwrap_or_default()
    }

    /// Load the archived id set, reporting read failures.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LedgerRead`] if the blob exists but cannot be
    /// fetched or decoded.
    pub async fn try_load(&self) -> Result<PostIds, PipelineError> {
        self.read_ids()
            .await
            .map_err(|source| PipelineError::LedgerRead { source })
    }

    async fn read_ids(&self) -> anyhow::Result<PostIds> {
        let existing = self
            .store
            .list(&self.key)
            .await
            .context("Failed to list ledger key")?;
        if !existing.iter().any(|k| k == &self.key) {
            info!(key = %self.key, "No existing post id ledger found, starting empty");
            return Ok(PostIds::new());
        }

        let Some(bytes) = self
            .store
            .get(&self.key)
            .await
            .context("Failed to fetch ledger")?
        else {
            return Ok(PostIds::new());
        };

        let ids: Vec<String> =
            serde_json::from_slice(&bytes).context("Ledger is not a JSON array of strings")?;
        info!(count = ids.len(), "Loaded stored post ids");
        Ok(ids.into_iter().collect())
    }

    /// Union `new_ids` into the persisted set and write it back.
    ///
    /// Failures are logged and swallowed; the worst outcome is re-extraction
    /// on the next run.
    pub async fn merge_and_persist(&self, new_ids: &PostIds) {
        let result = self.try_merge_and_persist(new_ids).await;
        // Ledger errors never propagate, so the fallback is always taken.
        let _ = recover(result, "persist post id ledger", || 0);
    }

    /// Union `new_ids` into the persisted set and write it back, returning
    /// the size of the persisted set.
    ///
    /// The current set is re-read first. If that read fails the write is
    /// skipped rather than replacing the ledger with a smaller set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LedgerRead`] or [`PipelineError::LedgerWrite`].
    pub async fn try_merge_and_persist(&self, new_ids: &PostIds) -> Result<usize, PipelineError> {
        let mut merged = self.try_load().await?;
        let before = merged.len();
        merged.extend(new_ids.iter().cloned());

        let body = encode_ids(&merged).map_err(|source| PipelineError::LedgerWrite { source })?;
        self.store
            .put(&self.key, &body, "application/json")
            .await
            .map_err(|source| PipelineError::LedgerWrite { source })?;

        info!(
            new_entries = merged.len() - before,
            total = merged.len(),
            "Updated post id ledger"
        );
        debug!(key = %self.key, bytes = body.len(), "Ledger written");
        Ok(merged.len())
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").field("key", &self.key).finish()
    }
}

/// Encode ids as a sorted JSON array.
fn encode_ids(ids: &PostIds) -> anyhow::Result<Vec<u8>> {
    let sorted: BTreeSet<&String> = ids.iter().collect();
    pretty_json(&sorted).context("Failed to encode ledger")
}
