//! Query model: the backend-neutral description of what the user is looking for.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result};

/// Earliest publication year a query may ask for.
pub const MIN_YEAR: i32 = 1800;

/// Bounds applied to `max_results` before any backend sees it.
pub const MIN_RESULTS: u32 = 1;
pub const MAX_RESULTS: u32 = 1000;
pub const DEFAULT_MAX_RESULTS: u32 = 50;

/// A bibliographic search backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Biomedical index (NCBI PubMed)
    Pubmed,
    /// General scholarly index (arXiv)
    Arxiv,
    /// Regional index (WHO Global Index Medicus)
    Gim,
    /// Google Scholar through SerpAPI; only available with an API key
    Scholar,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Pubmed,
        Backend::Arxiv,
        Backend::Gim,
        Backend::Scholar,
    ];

    /// Stable identifier used in config files, storage and CLI arguments.
    pub fn id(&self) -> &'static str {
        match self {
            Backend::Pubmed => "pubmed",
            Backend::Arxiv => "arxiv",
            Backend::Gim => "gim",
            Backend::Scholar => "scholar",
        }
    }

    /// Backends that cannot be queried without a configured API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Backend::Scholar)
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Pubmed => "PubMed",
            Backend::Arxiv => "arXiv",
            Backend::Gim => "Global Index Medicus",
            Backend::Scholar => "Google Scholar",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Backend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Backend::ALL
            .into_iter()
            .find(|b| b.id() == wanted)
            .ok_or_else(|| AppError::validation(format!("Unknown backend '{}'", s.trim())))
    }
}

/// Field restriction for a single search term.
///
/// Deserialization never fails: unrecognized values fall back to [`Field::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Field {
    #[default]
    Any,
    Title,
    TitleAbstract,
    Abstract,
    Author,
    Journal,
    Keyword,
    Mesh,
}

impl Field {
    /// Parse a field name leniently.
    pub fn parse(value: &str) -> Self {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "title" | "ti" => Field::Title,
            "titleabstract" | "tiab" | "tw" => Field::TitleAbstract,
            "abstract" | "ab" | "abs" => Field::Abstract,
            "author" | "au" => Field::Author,
            "journal" | "jr" | "ta" => Field::Journal,
            "keyword" | "kw" | "otherterm" => Field::Keyword,
            "mesh" | "meshterms" | "mh" => Field::Mesh,
            _ => Field::Any,
        }
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Numbers, booleans and the like are unrecognized too.
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(raw) => Field::parse(&raw),
            _ => Field::Any,
        })
    }
}

/// Boolean connective placed before a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Connective {
    #[default]
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
    #[serde(rename = "NOT", alias = "not", alias = "Not")]
    Not,
}

impl FromStr for Connective {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Connective::And),
            "OR" => Ok(Connective::Or),
            "NOT" => Ok(Connective::Not),
            other => Err(AppError::validation(format!("Unknown connective '{other}'"))),
        }
    }
}

/// One term of a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub text: String,

    #[serde(default)]
    pub field: Field,

    /// Ignored for the first active term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connective: Option<Connective>,
}

impl SearchTerm {
    pub fn new(text: impl Into<String>, field: Field, connective: Option<Connective>) -> Self {
        Self {
            text: text.into(),
            field,
            connective,
        }
    }

    /// A term takes part in translation only if it has non-blank text.
    pub fn is_active(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Caller-facing request shape for a direct search.
///
/// Nothing here is validated; [`Query::from_request`] does that.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub terms: Vec<SearchTerm>,

    #[serde(default)]
    pub backends: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
}

/// A validated, immutable query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QueryRequest", into = "QueryRequest")]
pub struct Query {
    terms: Vec<SearchTerm>,
    backends: BTreeSet<Backend>,
    start_year: Option<i32>,
    end_year: Option<i32>,
    max_results: u32,
}

impl Query {
    /// Validate a request against the current calendar year.
    pub fn from_request(request: QueryRequest) -> Result<Self> {
        Self::from_request_at(request, Utc::now().year())
    }

    /// Validate a request against an explicit "current" year.
    pub fn from_request_at(request: QueryRequest, current_year: i32) -> Result<Self> {
        let backends = request
            .backends
            .iter()
            .map(|b| b.parse::<Backend>())
            .collect::<Result<BTreeSet<_>>>()?;

        if backends.is_empty() {
            return Err(AppError::validation("At least one backend must be selected"));
        }

        for (label, year) in [("start_year", request.start_year), ("end_year", request.end_year)] {
            if let Some(year) = year {
                if !(MIN_YEAR..=current_year).contains(&year) {
                    return Err(AppError::validation(format!(
                        "{label} {year} outside [{MIN_YEAR}, {current_year}]"
                    )));
                }
            }
        }

        if let (Some(start), Some(end)) = (request.start_year, request.end_year) {
            if start > end {
                return Err(AppError::validation(format!(
                    "start_year {start} is after end_year {end}"
                )));
            }
        }

        let max_results = request
            .max_results
            .map(|n| n.clamp(MIN_RESULTS as i64, MAX_RESULTS as i64) as u32)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        Ok(Self {
            terms: request.terms,
            backends,
            start_year: request.start_year,
            end_year: request.end_year,
            max_results,
        })
    }

    /// Start building a query term by term.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    /// Terms that survive the blank-text filter, in input order.
    pub fn active_terms(&self) -> impl Iterator<Item = &SearchTerm> {
        self.terms.iter().filter(|t| t.is_active())
    }

    pub fn backends(&self) -> &BTreeSet<Backend> {
        &self.backends
    }

    /// The year range, only when both ends are present.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        self.start_year.zip(self.end_year)
    }

    pub fn start_year(&self) -> Option<i32> {
        self.start_year
    }

    pub fn end_year(&self) -> Option<i32> {
        self.end_year
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }
}

impl TryFrom<QueryRequest> for Query {
    type Error = AppError;

    fn try_from(request: QueryRequest) -> Result<Self> {
        Query::from_request(request)
    }
}

impl From<Query> for QueryRequest {
    fn from(query: Query) -> Self {
        Self {
            terms: query.terms,
            backends: query.backends.iter().map(|b| b.id().to_string()).collect(),
            start_year: query.start_year,
            end_year: query.end_year,
            max_results: Some(query.max_results as i64),
        }
    }
}

/// Fluent construction of a [`Query`].
///
/// ```
/// use litwatch::models::{Backend, Field, Query};
///
/// let query = Query::builder()
///     .term("COVID-19", Field::TitleAbstract)
///     .and("vaccin*", Field::Any)
///     .not("animal", Field::Any)
///     .years(2020, 2023)
///     .backend(Backend::Pubmed)
///     .build()
///     .unwrap();
/// assert_eq!(query.active_terms().count(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    request: QueryRequest,
}

impl QueryBuilder {
    fn push(mut self, text: &str, field: Field, connective: Option<Connective>) -> Self {
        self.request
            .terms
            .push(SearchTerm::new(text, field, connective));
        self
    }

    /// Add a term without an explicit connective (AND is implied).
    pub fn term(self, text: &str, field: Field) -> Self {
        self.push(text, field, None)
    }

    pub fn and(self, text: &str, field: Field) -> Self {
        self.push(text, field, Some(Connective::And))
    }

    pub fn or(self, text: &str, field: Field) -> Self {
        self.push(text, field, Some(Connective::Or))
    }

    pub fn not(self, text: &str, field: Field) -> Self {
        self.push(text, field, Some(Connective::Not))
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.request.backends.push(backend.id().to_string());
        self
    }

    pub fn backends(mut self, backends: impl IntoIterator<Item = Backend>) -> Self {
        self.request
            .backends
            .extend(backends.into_iter().map(|b| b.id().to_string()));
        self
    }

    pub fn years(mut self, start: i32, end: i32) -> Self {
        self.request.start_year = Some(start);
        self.request.end_year = Some(end);
        self
    }

    pub fn max_results(mut self, max_results: i64) -> Self {
        self.request.max_results = Some(max_results);
        self
    }

    pub fn build(self) -> Result<Query> {
        Query::from_request(self.request)
    }
}
