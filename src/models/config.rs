//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client behavior shared by every backend
    #[serde(default)]
    pub http: HttpConfig,

    /// Fan-out settings for direct and scheduled searches
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Alert sweep settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-backend endpoints and credentials
    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env();
            config
        })
    }

    /// Secrets may come from the environment instead of the file.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("PUBMED_API_KEY") {
            if !key.trim().is_empty() {
                self.backends.pubmed.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("SERPAPI_KEY") {
            if !key.trim().is_empty() {
                self.backends.scholar.api_key = Some(key);
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.aggregator.backend_timeout_secs == 0 {
            return Err(AppError::validation(
                "aggregator.backend_timeout_secs must be > 0",
            ));
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(AppError::validation("scheduler.max_concurrent must be > 0"));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(AppError::validation(
                "scheduler.poll_interval_secs must be > 0",
            ));
        }
        for (name, base_url) in [
            ("pubmed", &self.backends.pubmed.base_url),
            ("arxiv", &self.backends.arxiv.base_url),
            ("gim", &self.backends.gim.base_url),
            ("scholar", &self.backends.scholar.base_url),
        ] {
            url::Url::parse(base_url).map_err(|e| {
                AppError::config(format!("backends.{name}.base_url '{base_url}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per backend call, including the first
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff delay; doubles per retry
    #[serde(default = "defaults::retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            retry_attempts: defaults::retry_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay(),
        }
    }
}

/// Aggregator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Deadline for one backend call, retries included
    #[serde(default = "defaults::backend_timeout")]
    pub backend_timeout_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            backend_timeout_secs: defaults::backend_timeout(),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two sweeps in watch mode
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Saved searches executed concurrently within one sweep
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Restrict re-runs to records added since the previous successful check
    #[serde(default = "defaults::since_last_check")]
    pub since_last_check: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::poll_interval(),
            max_concurrent: defaults::max_concurrent(),
            since_last_check: defaults::since_last_check(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub pubmed: PubmedConfig,

    #[serde(default)]
    pub arxiv: ArxivConfig,

    #[serde(default)]
    pub gim: GimConfig,

    #[serde(default)]
    pub scholar: ScholarConfig,
}

/// NCBI E-utilities endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubmedConfig {
    #[serde(default = "defaults::pubmed_url")]
    pub base_url: String,

    /// Raises the NCBI rate limit when present (`PUBMED_API_KEY` overrides)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for PubmedConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::pubmed_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "defaults::arxiv_url")]
    pub base_url: String,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::arxiv_url(),
        }
    }
}

/// SerpAPI Google Scholar engine. The backend is disabled without a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScholarConfig {
    #[serde(default = "defaults::scholar_url")]
    pub base_url: String,

    /// `SERPAPI_KEY` overrides
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ScholarConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::scholar_url(),
            api_key: None,
        }
    }
}

/// Global Index Medicus portal and the selectors used to scrape its result list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GimConfig {
    #[serde(default = "defaults::gim_url")]
    pub base_url: String,

    #[serde(default)]
    pub selectors: GimSelectors,
}

impl Default for GimConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::gim_url(),
            selectors: GimSelectors::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GimSelectors {
    #[serde(default = "defaults::gim_record")]
    pub record: String,
    #[serde(default = "defaults::gim_title")]
    pub title: String,
    #[serde(default = "defaults::gim_author")]
    pub author: String,
    #[serde(default = "defaults::gim_abstract")]
    pub abstract_text: String,
    #[serde(default = "defaults::gim_source")]
    pub source: String,
    /// Element holding the portal's document id, when the link carries none
    #[serde(default = "defaults::gim_doc_id")]
    pub doc_id: String,
}

impl Default for GimSelectors {
    fn default() -> Self {
        Self {
            record: defaults::gim_record(),
            title: defaults::gim_title(),
            author: defaults::gim_author(),
            abstract_text: defaults::gim_abstract(),
            source: defaults::gim_source(),
            doc_id: defaults::gim_doc_id(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; litwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn retry_attempts() -> u32 {
        3
    }
    pub fn retry_base_delay() -> u64 {
        2000
    }

    // Aggregator / scheduler defaults
    pub fn backend_timeout() -> u64 {
        60
    }
    pub fn poll_interval() -> u64 {
        3600
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn since_last_check() -> bool {
        true
    }

    // Backend endpoints
    pub fn pubmed_url() -> String {
        "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".into()
    }
    pub fn arxiv_url() -> String {
        "http://export.arxiv.org/api/query".into()
    }
    pub fn gim_url() -> String {
        "https://pesquisa.bvsalud.org/gim/".into()
    }
    pub fn scholar_url() -> String {
        "https://serpapi.com/search".into()
    }

    // GIM result page selectors
    pub fn gim_record() -> String {
        r#".box1[data-test="result_resource_item"]"#.into()
    }
    pub fn gim_title() -> String {
        ".titleArt a".into()
    }
    pub fn gim_author() -> String {
        ".author a".into()
    }
    pub fn gim_abstract() -> String {
        ".reference-detail".into()
    }
    pub fn gim_source() -> String {
        ".reference em".into()
    }
    pub fn gim_doc_id() -> String {
        ".doc_id".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
