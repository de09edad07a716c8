// src/models/mod.rs

//! Domain models for litwatch.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod alert;
mod config;
mod query;
mod record;

// Re-export all public types
pub use alert::{
    BackendFailure, Frequency, NewSavedSearch, RunSummary, SaveSearchRequest, SavedSearch,
    SeenResult, SweepReport, normalize_contact,
};
pub use config::{
    AggregatorConfig, ArxivConfig, BackendsConfig, Config, GimConfig, GimSelectors, HttpConfig,
    LoggingConfig, PubmedConfig, SchedulerConfig, ScholarConfig,
};
pub use query::{
    Backend, Connective, DEFAULT_MAX_RESULTS, Field, MAX_RESULTS, MIN_RESULTS, MIN_YEAR, Query,
    QueryBuilder, QueryRequest, SearchTerm,
};
pub use record::{PublicationDate, ResultRecord};
