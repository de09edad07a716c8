//! Offline client that fabricates a fixed batch of records.
//!
//! Drives "test alert" runs: the scheduler goes through its usual diff and
//! notification steps without any network traffic.

use async_trait::async_trait;
use chrono::Utc;

use crate::backends::{BackendClient, BackendError};
use crate::models::{Backend, PublicationDate, ResultRecord};

/// Records produced per backend for a test run.
pub const SYNTHETIC_BATCH: usize = 5;

pub struct SyntheticClient {
    backend: Backend,
    batch: usize,
}

impl SyntheticClient {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            batch: SYNTHETIC_BATCH,
        }
    }

    /// The fixed batch, ids `test_<backend>_<n>` starting at 1.
    pub fn records(&self) -> Vec<ResultRecord> {
        let today = PublicationDate::Date(Utc::now().date_naive());
        (1..=self.batch)
            .map(|n| {
                let id = format!("test_{}_{}", self.backend.id(), n);
                let mut record = ResultRecord::new(
                    self.backend,
                    id.clone(),
                    format!("Test result {n} from {}", self.backend.label()),
                    format!("https://example.org/{id}"),
                );
                record.authors = vec!["Test Author".to_string()];
                record.abstract_text = Some("Synthetic record generated for an alert test.".into());
                record.publication_date = Some(today);
                record.with_extra("synthetic", "true")
            })
            .collect()
    }
}

#[async_trait]
impl BackendClient for SyntheticClient {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn search(
        &self,
        _native_query: &str,
        max_results: u32,
    ) -> Result<Vec<ResultRecord>, BackendError> {
        let mut records = self.records();
        records.truncate(max_results as usize);
        Ok(records)
    }
}
