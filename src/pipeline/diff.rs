//! Diff calculation for saved-search alerts.
//!
//! Compares a fresh batch of records against the `(backend, external_id)`
//! pairs already recorded for a saved search. Only additions matter: a paper
//! that drops out of a backend's result list is not an event.

use std::collections::HashSet;

use serde::Serialize;

use crate::models::{Backend, ResultRecord};
use crate::storage::SeenKeys;

/// Outcome of one diff.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffResult {
    /// Records not seen before, in input order
    pub added: Vec<ResultRecord>,
    /// Records already recorded for the search
    pub already_seen: usize,
    /// Repeats of the same key within the batch
    pub duplicates: usize,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty()
    }

    pub fn added_count(&self) -> usize {
        self.added.len()
    }
}

/// Calculator for new-result detection.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator;

impl DiffCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Split `current` into records new to `seen` and records already known.
    pub fn calculate(&self, seen: &SeenKeys, current: Vec<ResultRecord>) -> DiffResult {
        let mut batch: HashSet<(Backend, String)> = HashSet::new();
        let mut result = DiffResult::default();

        for record in current {
            let key = (record.backend, record.external_id.clone());
            if seen.contains(&key) {
                result.already_seen += 1;
            } else if !batch.insert(key) {
                result.duplicates += 1;
            } else {
                result.added.push(record);
            }
        }

        result
    }
}

/// Convenience function to calculate a diff.
pub fn calculate_diff(seen: &SeenKeys, current: Vec<ResultRecord>) -> DiffResult {
    DiffCalculator::new().calculate(seen, current)
}
