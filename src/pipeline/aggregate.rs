// src/pipeline/aggregate.rs

//! Fan one query out to every selected backend and fold the outcomes.
//!
//! Each backend gets its own translation and one client call bounded by the
//! configured timeout. A failing backend turns into an error outcome in the
//! response; it never aborts the aggregation or hides the other backends.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::backends::{BackendClient, BackendError, ClientMap};
use crate::models::{Backend, BackendFailure, Query, ResultRecord};
use crate::translate;

/// Result of one backend within an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BackendOutcome {
    Ok { records: Vec<ResultRecord> },
    Error { reason: String },
}

impl BackendOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, BackendOutcome::Ok { .. })
    }

    pub fn records(&self) -> &[ResultRecord] {
        match self {
            BackendOutcome::Ok { records } => records,
            BackendOutcome::Error { .. } => &[],
        }
    }
}

/// Merged response keyed by backend. Every requested backend is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub outcomes: BTreeMap<Backend, BackendOutcome>,
}

impl AggregateResponse {
    pub fn total_records(&self) -> usize {
        self.outcomes.values().map(|o| o.records().len()).sum()
    }

    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.values().all(|o| !o.is_ok())
    }

    pub fn failures(&self) -> Vec<BackendFailure> {
        self.outcomes
            .iter()
            .filter_map(|(backend, outcome)| match outcome {
                BackendOutcome::Error { reason } => Some(BackendFailure {
                    backend: *backend,
                    reason: reason.clone(),
                }),
                BackendOutcome::Ok { .. } => None,
            })
            .collect()
    }

    /// Records of the successful backends, in backend order.
    pub fn into_records(self) -> Vec<ResultRecord> {
        self.outcomes
            .into_values()
            .flat_map(|outcome| match outcome {
                BackendOutcome::Ok { records } => records,
                BackendOutcome::Error { .. } => Vec::new(),
            })
            .collect()
    }
}

/// Runs queries against a fixed set of backend clients.
#[derive(Clone)]
pub struct Aggregator {
    clients: Arc<ClientMap>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(clients: ClientMap, timeout: Duration) -> Self {
        Self {
            clients: Arc::new(clients),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `query` on all of its backends concurrently.
    pub async fn aggregate(&self, query: &Query) -> AggregateResponse {
        self.aggregate_since(query, None).await
    }

    /// Like [`aggregate`](Self::aggregate), restricted to records added on or after `since`.
    pub async fn aggregate_since(&self, query: &Query, since: Option<NaiveDate>) -> AggregateResponse {
        let max_results = query.max_results();
        let backends: Vec<Backend> = query.backends().iter().copied().collect();

        log::info!(
            "Aggregating over {} backend(s), max {} results each{}",
            backends.len(),
            max_results,
            since.map(|d| format!(", since {d}")).unwrap_or_default()
        );

        let outcomes: BTreeMap<Backend, BackendOutcome> = stream::iter(backends.clone())
            .map(|backend| async move {
                let outcome = match self.clients.get(&backend) {
                    Some(client) => {
                        let native = translate::translate_since(backend, query, since);
                        self.call(client.as_ref(), &native, max_results).await
                    }
                    None => BackendOutcome::Error {
                        reason: "no client configured".to_string(),
                    },
                };
                (backend, outcome)
            })
            .buffer_unordered(backends.len().max(1))
            .collect()
            .await;

        outcomes.iter().for_each(|(backend, outcome)| match outcome {
            BackendOutcome::Ok { records } => {
                log::info!("{}: {} record(s)", backend, records.len())
            }
            BackendOutcome::Error { reason } => log::warn!("{}: failed: {}", backend, reason),
        });

        AggregateResponse { outcomes }
    }

    async fn call(
        &self,
        client: &dyn BackendClient,
        native_query: &str,
        max_results: u32,
    ) -> BackendOutcome {
        log::debug!("{} <- {}", client.backend(), native_query);
        let result = tokio::time::timeout(self.timeout, client.search(native_query, max_results))
            .await
            .unwrap_or_else(|_| Err(BackendError::Timeout(self.timeout)));

        match result {
            Ok(mut records) => {
                records.truncate(max_results as usize);
                BackendOutcome::Ok { records }
            }
            Err(error) => BackendOutcome::Error {
                reason: error.to_string(),
            },
        }
    }
}
