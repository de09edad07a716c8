//! Saved searches, seen results and run reports.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Backend, Query, QueryRequest, ResultRecord};
use crate::translate;

/// How often a saved search is re-executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[serde(alias = "DAILY")]
    Daily,
    #[serde(alias = "WEEKLY")]
    Weekly,
    #[default]
    #[serde(alias = "MONTHLY")]
    Monthly,
}

impl Frequency {
    /// Minimum time between two scheduled executions.
    pub fn interval(&self) -> TimeDelta {
        match self {
            Frequency::Daily => TimeDelta::days(1),
            Frequency::Weekly => TimeDelta::days(7),
            Frequency::Monthly => TimeDelta::days(30),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        })
    }
}

impl FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(AppError::validation(format!("Unknown frequency '{other}'"))),
        }
    }
}

/// Caller-facing request shape for saving a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveSearchRequest {
    pub name: String,

    #[serde(flatten)]
    pub query: QueryRequest,

    #[serde(default)]
    pub frequency: Frequency,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_contact: Option<String>,
}

/// A validated saved search that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewSavedSearch {
    pub name: String,
    pub query: Query,
    pub frequency: Frequency,
    pub owner_contact: Option<String>,
}

impl NewSavedSearch {
    pub fn from_request(request: SaveSearchRequest) -> Result<Self> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Saved search name is required"));
        }

        Ok(Self {
            name,
            query: Query::from_request(request.query)?,
            frequency: request.frequency,
            owner_contact: normalize_contact(request.owner_contact),
        })
    }
}

/// Blank contacts are treated as absent.
pub fn normalize_contact(contact: Option<String>) -> Option<String> {
    contact
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// A query persisted for periodic re-execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: u64,

    /// Unique per owner
    pub name: String,

    pub query: Query,

    pub frequency: Frequency,

    /// Inactive searches are skipped by the scheduler but can still be run by hand
    pub active: bool,

    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_contact: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl SavedSearch {
    pub fn backends(&self) -> impl Iterator<Item = Backend> + '_ {
        self.query.backends().iter().copied()
    }

    /// Native query string per backend, derived from the stored query.
    pub fn native_queries(&self) -> BTreeMap<Backend, String> {
        translate::translate_all(&self.query)
    }

    /// Whether the scheduler should pick this search up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        match self.last_checked_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.frequency.interval(),
        }
    }

    /// Owner key for name uniqueness.
    pub fn same_owner(&self, contact: Option<&str>) -> bool {
        self.owner_contact.as_deref() == contact
    }
}

/// A result already surfaced for a saved search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenResult {
    pub id: u64,
    pub saved_search_id: u64,
    pub record: ResultRecord,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl SeenResult {
    pub fn backend(&self) -> Backend {
        self.record.backend
    }

    pub fn external_id(&self) -> &str {
        &self.record.external_id
    }
}

/// Error descriptor for one backend of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: Backend,
    pub reason: String,
}

/// Outcome of one saved-search execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub saved_search_id: u64,
    pub name: String,

    /// False only when every backend failed
    pub success: bool,

    pub new_result_count: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_backend_errors: Vec<BackendFailure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Synthetic test run: nothing was persisted
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub test_run: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_results: Vec<SeenResult>,
}

/// Aggregate outcome of one scheduler sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub total_searches: usize,
    pub searches_with_new_results: usize,
    pub total_new_results: usize,
    pub failed_searches: usize,

    /// Due searches skipped because a run for the same id was already in flight
    pub skipped_in_flight: usize,

    /// Searches that were run, toggled off or deleted between listing and locking
    #[serde(default)]
    pub skipped_not_due: usize,

    pub details: Vec<RunSummary>,
}

impl SweepReport {
    pub fn record(&mut self, summary: RunSummary) {
        if summary.new_result_count > 0 {
            self.searches_with_new_results += 1;
            self.total_new_results += summary.new_result_count;
        }
        if !summary.success {
            self.failed_searches += 1;
        }
        self.details.push(summary);
    }
}
