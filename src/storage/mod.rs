//! Storage abstractions for saved searches and seen results.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Runtime configuration
//! └── store.json            # Saved searches + seen results
//! ```
//!
//! Seen results are keyed by `(saved_search_id, backend, external_id)`; inserting
//! an existing key is a silent no-op, so a repeated diff never duplicates rows.

pub mod local;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Backend, NewSavedSearch, ResultRecord, SavedSearch, SeenResult};

pub use local::LocalStore;

/// `(backend, external_id)` pairs already recorded for one saved search.
pub type SeenKeys = HashSet<(Backend, String)>;

/// Filters for listing seen results.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub saved_search_id: Option<u64>,
    pub backend: Option<Backend>,
    pub unread_only: bool,
    pub limit: Option<usize>,
}

impl ResultFilter {
    pub fn matches(&self, result: &SeenResult) -> bool {
        self.saved_search_id
            .is_none_or(|id| result.saved_search_id == id)
            && self.backend.is_none_or(|b| result.backend() == b)
            && (!self.unread_only || !result.is_read)
    }
}

/// Durable record of saved searches and the results already surfaced for them.
#[async_trait]
pub trait SavedSearchStore: Send + Sync {
    /// Persist a new saved search. Fails with `Conflict` when the owner already
    /// has a search with the same name.
    async fn create(&self, search: NewSavedSearch, now: DateTime<Utc>) -> Result<SavedSearch>;

    async fn get(&self, id: u64) -> Result<SavedSearch>;

    async fn list(&self) -> Result<Vec<SavedSearch>>;

    async fn set_active(&self, id: u64, active: bool) -> Result<SavedSearch>;

    /// Flip the active flag.
    async fn toggle(&self, id: u64) -> Result<SavedSearch> {
        let current = self.get(id).await?;
        self.set_active(id, !current.active).await
    }

    /// Remove a saved search together with its seen results.
    async fn delete(&self, id: u64) -> Result<()>;

    async fn update_last_checked(&self, id: u64, at: DateTime<Utc>) -> Result<()>;

    async fn seen_keys(&self, id: u64) -> Result<SeenKeys>;

    /// Record results for a saved search, returning only the rows that were new.
    async fn insert_seen(
        &self,
        id: u64,
        records: Vec<ResultRecord>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeenResult>>;

    /// Seen results matching `filter`, newest first.
    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<SeenResult>>;

    /// Mark one seen result as read. Idempotent.
    async fn mark_read(&self, result_id: u64) -> Result<SeenResult>;
}
