//! Local filesystem storage implementation.
//!
//! The whole store lives in one JSON document. Nothing is cached: every
//! operation re-reads the file, so a long-running `watch` sees searches saved,
//! toggled or deleted by other processes. Mutations are serialized by a mutex
//! within the process and written atomically (temp file + rename).
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── store.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{NewSavedSearch, ResultRecord, SavedSearch, SeenResult};
use crate::storage::{ResultFilter, SavedSearchStore, SeenKeys};

const STORE_FILE: &str = "store.json";

/// Serialized shape of `store.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    next_search_id: u64,
    next_result_id: u64,
    #[serde(default)]
    searches: BTreeMap<u64, SavedSearch>,
    #[serde(default)]
    seen: Vec<SeenResult>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            next_search_id: 1,
            next_result_id: 1,
            searches: BTreeMap::new(),
            seen: Vec::new(),
        }
    }
}

impl StoreState {
    fn search_mut(&mut self, id: u64) -> Result<&mut SavedSearch> {
        self.searches
            .get_mut(&id)
            .ok_or_else(|| AppError::search_not_found(id))
    }
}

/// Local filesystem store.
pub struct LocalStore {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a store rooted at the given directory. Nothing is read until first use.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Read JSON data, returning None if the file doesn't exist.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Run `f` against the on-disk state without persisting.
    async fn read<T>(&self, f: impl FnOnce(&StoreState) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let state = self.load().await?;
        f(&state)
    }

    /// Reload the on-disk state, apply `f`, and persist the result.
    ///
    /// Nothing is written when `f` fails.
    async fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await?;
        let value = f(&mut state)?;
        self.write_json(STORE_FILE, &state).await?;
        Ok(value)
    }

    async fn load(&self) -> Result<StoreState> {
        match self.read_json::<StoreState>(STORE_FILE).await? {
            Some(state) => {
                log::debug!(
                    "Loaded {} saved searches and {} seen results from {:?}",
                    state.searches.len(),
                    state.seen.len(),
                    self.path(STORE_FILE)
                );
                Ok(state)
            }
            None => {
                log::debug!("No {} in {:?}, starting empty", STORE_FILE, self.root_dir);
                Ok(StoreState::default())
            }
        }
    }
}

#[async_trait]
impl SavedSearchStore for LocalStore {
    async fn create(&self, search: NewSavedSearch, now: DateTime<Utc>) -> Result<SavedSearch> {
        self.mutate(|state| {
            let owner = search.owner_contact.as_deref();
            if state
                .searches
                .values()
                .any(|s| s.same_owner(owner) && s.name == search.name)
            {
                return Err(AppError::conflict(format!(
                    "saved search named '{}' already exists",
                    search.name
                )));
            }

            let id = state.next_search_id;
            state.next_search_id += 1;

            let saved = SavedSearch {
                id,
                name: search.name,
                query: search.query,
                frequency: search.frequency,
                active: true,
                last_checked_at: None,
                owner_contact: search.owner_contact,
                created_at: now,
            };
            state.searches.insert(id, saved.clone());
            Ok(saved)
        })
        .await
    }

    async fn get(&self, id: u64) -> Result<SavedSearch> {
        self.read(|state| {
            state
                .searches
                .get(&id)
                .cloned()
                .ok_or_else(|| AppError::search_not_found(id))
        })
        .await
    }

    async fn list(&self) -> Result<Vec<SavedSearch>> {
        self.read(|state| Ok(state.searches.values().cloned().collect()))
            .await
    }

    async fn set_active(&self, id: u64, active: bool) -> Result<SavedSearch> {
        self.mutate(|state| {
            let search = state.search_mut(id)?;
            search.active = active;
            Ok(search.clone())
        })
        .await
    }

    async fn delete(&self, id: u64) -> Result<()> {
        self.mutate(|state| {
            if state.searches.remove(&id).is_none() {
                return Err(AppError::search_not_found(id));
            }
            let before = state.seen.len();
            state.seen.retain(|r| r.saved_search_id != id);
            log::info!(
                "Deleted saved search {} and {} seen results",
                id,
                before - state.seen.len()
            );
            Ok(())
        })
        .await
    }

    async fn update_last_checked(&self, id: u64, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|state| {
            state.search_mut(id)?.last_checked_at = Some(at);
            Ok(())
        })
        .await
    }

    async fn seen_keys(&self, id: u64) -> Result<SeenKeys> {
        self.read(|state| {
            if !state.searches.contains_key(&id) {
                return Err(AppError::search_not_found(id));
            }
            Ok(state
                .seen
                .iter()
                .filter(|r| r.saved_search_id == id)
                .map(|r| (r.backend(), r.external_id().to_string()))
                .collect())
        })
        .await
    }

    async fn insert_seen(
        &self,
        id: u64,
        records: Vec<ResultRecord>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SeenResult>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        self.mutate(|state| {
            if !state.searches.contains_key(&id) {
                return Err(AppError::search_not_found(id));
            }

            let mut keys: SeenKeys = state
                .seen
                .iter()
                .filter(|r| r.saved_search_id == id)
                .map(|r| (r.backend(), r.external_id().to_string()))
                .collect();

            let mut inserted = Vec::new();
            for record in records {
                if !keys.insert((record.backend, record.external_id.clone())) {
                    continue;
                }
                let row = SeenResult {
                    id: state.next_result_id,
                    saved_search_id: id,
                    record,
                    discovered_at: now,
                    is_read: false,
                };
                state.next_result_id += 1;
                state.seen.push(row.clone());
                inserted.push(row);
            }
            Ok(inserted)
        })
        .await
    }

    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<SeenResult>> {
        self.read(|state| {
            let mut results: Vec<SeenResult> = state
                .seen
                .iter()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            results.sort_by(|a, b| {
                b.discovered_at
                    .cmp(&a.discovered_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
            if let Some(limit) = filter.limit {
                results.truncate(limit);
            }
            Ok(results)
        })
        .await
    }

    async fn mark_read(&self, result_id: u64) -> Result<SeenResult> {
        // Skip the write when already read.
        let current = self
            .read(|state| {
                state
                    .seen
                    .iter()
                    .find(|r| r.id == result_id)
                    .cloned()
                    .ok_or_else(|| AppError::result_not_found(result_id))
            })
            .await?;
        if current.is_read {
            return Ok(current);
        }

        self.mutate(|state| {
            let row = state
                .seen
                .iter_mut()
                .find(|r| r.id == result_id)
                .ok_or_else(|| AppError::result_not_found(result_id))?;
            row.is_read = true;
            Ok(row.clone())
        })
        .await
    }
}
