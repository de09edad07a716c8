//! Normalized search result record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::Backend;

/// Publication date at the finest granularity a backend gave us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationDate {
    Date(NaiveDate),
    Year(i32),
}

impl PublicationDate {
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        match self {
            PublicationDate::Date(date) => date.year(),
            PublicationDate::Year(year) => *year,
        }
    }
}

impl fmt::Display for PublicationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicationDate::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PublicationDate::Year(year) => write!(f, "{year}"),
        }
    }
}

/// A single paper returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub backend: Backend,

    /// Backend-native identifier (PMID, arXiv id, ...), unique within the backend
    pub external_id: String,

    pub title: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<PublicationDate>,

    /// Backend-specific metadata (journal, DOI, PDF link, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ResultRecord {
    pub fn new(
        backend: Backend,
        external_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            external_id: external_id.into(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: None,
            url: url.into(),
            publication_date: None,
            extra: BTreeMap::new(),
        }
    }

    /// Deduplication key within one saved search.
    pub fn key(&self) -> (Backend, &str) {
        (self.backend, self.external_id.as_str())
    }

    /// Attach a metadata value, skipping blanks.
    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.extra.insert(key.to_string(), value);
        }
        self
    }

    /// One-line rendering used by notifications and CLI listings.
    pub fn summary_line(&self) -> String {
        let authors = match self.authors.len() {
            0 => String::new(),
            1 => format!(" ({})", self.authors[0]),
            _ => format!(" ({} et al.)", self.authors[0]),
        };
        let date = self
            .publication_date
            .map(|d| format!(" [{d}]"))
            .unwrap_or_default();
        format!("{}{}{} - {}", self.title, authors, date, self.url)
    }
}
