// src/backends/mod.rs

//! Backend clients: one network adapter per bibliographic service.
//!
//! A client receives an already-translated native query string and returns
//! normalized [`ResultRecord`]s, or a typed [`BackendError`]. Clients never see
//! a [`Query`](crate::models::Query); translation happens in [`crate::translate`].

pub mod arxiv;
pub mod gim;
pub mod pubmed;
pub mod scholar;
pub mod synthetic;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;
use crate::models::{Backend, Config, ResultRecord};
use crate::utils::http::{RetryPolicy, create_async_client};

pub use arxiv::ArxivClient;
pub use gim::GimClient;
pub use pubmed::PubmedClient;
pub use scholar::ScholarClient;
pub use synthetic::SyntheticClient;

/// Failure of a single backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("rate limited")]
    RateLimited,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no query")]
    EmptyQuery,

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl BackendError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Network(_) | BackendError::RateLimited => true,
            BackendError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

/// Network adapter for one backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    fn backend(&self) -> Backend;

    /// Run a native query, returning at most `max_results` records.
    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> std::result::Result<Vec<ResultRecord>, BackendError>;
}

/// Clients keyed by the backend they serve.
pub type ClientMap = HashMap<Backend, Arc<dyn BackendClient>>;

/// Build the live HTTP client for every known backend.
///
/// Google Scholar is left out without a SerpAPI key; queries selecting it then
/// report "no client configured" for that backend.
pub fn build_clients(config: &Config) -> Result<ClientMap> {
    let http = create_async_client(&config.http)?;
    let retry = RetryPolicy::from_config(&config.http);

    let mut clients: ClientMap = HashMap::new();
    for backend in Backend::ALL {
        let client: Arc<dyn BackendClient> = match backend {
            Backend::Pubmed => Arc::new(PubmedClient::new(
                http.clone(),
                &config.backends.pubmed,
                retry,
            )?),
            Backend::Arxiv => Arc::new(ArxivClient::new(
                http.clone(),
                &config.backends.arxiv,
                retry,
            )?),
            Backend::Gim => Arc::new(GimClient::new(http.clone(), &config.backends.gim, retry)?),
            Backend::Scholar => {
                let key = config.backends.scholar.api_key.as_deref();
                if key.is_none_or(|k| k.trim().is_empty()) {
                    log::debug!("No SerpAPI key, Google Scholar disabled");
                    continue;
                }
                Arc::new(ScholarClient::new(
                    http.clone(),
                    &config.backends.scholar,
                    retry,
                )?)
            }
        };
        clients.insert(backend, client);
    }

    log::debug!("Built {} backend clients", clients.len());
    Ok(clients)
}

/// Reject blank native queries before any request goes out.
pub(crate) fn require_query(native_query: &str) -> std::result::Result<&str, BackendError> {
    let trimmed = native_query.trim();
    if trimmed.is_empty() {
        Err(BackendError::EmptyQuery)
    } else {
        Ok(trimmed)
    }
}
