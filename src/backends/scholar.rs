// src/backends/scholar.rs

//! Google Scholar through the SerpAPI `google_scholar` engine.
//!
//! The native query may carry `as_ylo:YYYY` / `as_yhi:YYYY` tokens (see
//! [`ScholarTranslator`](crate::translate::ScholarTranslator)); they are lifted
//! into request parameters and the rest becomes `q`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::backends::{BackendClient, BackendError, require_query};
use crate::error::{AppError, Result};
use crate::models::{Backend, ResultRecord, ScholarConfig};
use crate::utils::date::parse_publication_date;
use crate::utils::http::{RetryPolicy, fetch_text, with_retry};
use crate::utils::{normalize_whitespace, stable_id};

/// SerpAPI returns at most this many Scholar results per page.
const PAGE_SIZE: u32 = 20;

/// SerpAPI reports an empty result set through its `error` field.
const NO_RESULTS: &str = "hasn't returned any results";

pub struct ScholarClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    retry: RetryPolicy,
}

/// Native query split into SerpAPI parameters.
#[derive(Debug, Default, PartialEq, Eq)]
struct ScholarRequest {
    q: String,
    year_low: Option<i32>,
    year_high: Option<i32>,
}

impl ScholarClient {
    pub fn new(http: reqwest::Client, config: &ScholarConfig, retry: RetryPolicy) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::config("backends.scholar.api_key is not set"))?;
        Ok(Self {
            http,
            endpoint: Url::parse(&config.base_url)?,
            api_key,
            retry,
        })
    }

    fn page_url(&self, request: &ScholarRequest, start: u32, num: u32) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("engine", "google_scholar")
                .append_pair("q", &request.q)
                .append_pair("hl", "en")
                .append_pair("start", &start.to_string())
                .append_pair("num", &num.to_string());
            if let Some(year) = request.year_low {
                pairs.append_pair("as_ylo", &year.to_string());
            }
            if let Some(year) = request.year_high {
                pairs.append_pair("as_yhi", &year.to_string());
            }
            pairs.append_pair("api_key", &self.api_key);
        }
        url
    }
}

#[async_trait]
impl BackendClient for ScholarClient {
    fn backend(&self) -> Backend {
        Backend::Scholar
    }

    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> std::result::Result<Vec<ResultRecord>, BackendError> {
        let request = split_native_query(native_query);
        require_query(&request.q)?;

        let mut records = Vec::new();
        let mut start = 0;
        while (records.len() as u32) < max_results {
            let num = PAGE_SIZE.min(max_results - records.len() as u32);
            let url = self.page_url(&request, start, num);
            let body = with_retry(self.retry, "scholar search", || {
                fetch_text(&self.http, url.clone())
            })
            .await?;

            let page = parse_results(&body)?;
            let fetched = page.len() as u32;
            records.extend(page);
            if fetched < num {
                break;
            }
            start += fetched;
        }

        records.truncate(max_results as usize);
        log::debug!("Scholar: {} results", records.len());
        Ok(records)
    }
}

fn year_token() -> &'static Regex {
    static YEAR_TOKEN: OnceLock<Regex> = OnceLock::new();
    YEAR_TOKEN.get_or_init(|| {
        Regex::new(r"(?:\bAND\s+)?\bas_y(lo|hi):(\d{4})\b").expect("valid year token regex")
    })
}

fn doi_pattern() -> &'static Regex {
    static DOI: OnceLock<Regex> = OnceLock::new();
    DOI.get_or_init(|| Regex::new(r"(?i)\b10\.\d{4,9}/[-._;()/:a-z0-9]+").expect("valid doi regex"))
}

/// Lift year tokens out of the query. Repeated limits keep the narrowest one.
fn split_native_query(native_query: &str) -> ScholarRequest {
    let mut request = ScholarRequest::default();
    for caps in year_token().captures_iter(native_query) {
        let Ok(year) = caps[2].parse::<i32>() else {
            continue;
        };
        if &caps[1] == "lo" {
            request.year_low = Some(request.year_low.map_or(year, |y| y.max(year)));
        } else {
            request.year_high = Some(request.year_high.map_or(year, |y| y.min(year)));
        }
    }
    let rest = year_token().replace_all(native_query, " ");
    let rest = normalize_whitespace(&rest);
    request.q = rest
        .strip_suffix(" AND")
        .map(str::to_string)
        .unwrap_or(rest);
    if request.q == "AND" {
        request.q.clear();
    }
    request
}

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    result_id: Option<String>,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    publication_info: PublicationInfo,
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    inline_links: InlineLinks,
}

#[derive(Debug, Default, Deserialize)]
struct PublicationInfo {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    authors: Vec<ScholarAuthor>,
}

#[derive(Debug, Deserialize)]
struct ScholarAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    file_format: String,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Default, Deserialize)]
struct InlineLinks {
    cited_by: Option<CitedBy>,
}

#[derive(Debug, Deserialize)]
struct CitedBy {
    #[serde(default)]
    total: u64,
}

fn parse_results(body: &str) -> std::result::Result<Vec<ResultRecord>, BackendError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::malformed(format!("serpapi: {e}")))?;

    if let Some(error) = response.error {
        if error.contains(NO_RESULTS) {
            return Ok(Vec::new());
        }
        return Err(BackendError::malformed(format!("serpapi: {error}")));
    }

    Ok(response
        .organic_results
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .map(to_record)
        .collect())
}

fn find_doi(item: &OrganicResult) -> Option<String> {
    [
        item.link.as_str(),
        item.snippet.as_str(),
        item.title.as_str(),
        item.publication_info.summary.as_str(),
    ]
    .into_iter()
    .find_map(|text| doi_pattern().find(text))
    .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
}

fn to_record(item: OrganicResult) -> ResultRecord {
    let title = normalize_whitespace(&item.title);
    let doi = find_doi(&item);
    let external_id = item
        .result_id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| doi.clone())
        .unwrap_or_else(|| stable_id(&[title.as_str(), item.link.as_str()]));

    let summary = normalize_whitespace(&item.publication_info.summary);
    // "A Author, B Author - Journal, 2020 - publisher.com"
    let source = summary
        .split(" - ")
        .nth(1)
        .map(|s| s.trim_end_matches(|c: char| c.is_ascii_digit() || c == ',' || c == ' '))
        .unwrap_or_default()
        .to_string();

    let mut record = ResultRecord::new(Backend::Scholar, external_id, title, item.link.clone());
    record.authors = if item.publication_info.authors.is_empty() {
        summary
            .split(" - ")
            .next()
            .filter(|_| summary.contains(" - "))
            .map(|names| {
                names
                    .split(',')
                    .map(|n| n.trim().trim_end_matches('…').trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        item.publication_info.authors.into_iter().map(|a| a.name).collect()
    };
    record.abstract_text = Some(normalize_whitespace(&item.snippet)).filter(|s| !s.is_empty());
    record.publication_date = parse_publication_date(&summary);

    let pdf_url = item
        .resources
        .into_iter()
        .find(|r| r.file_format.eq_ignore_ascii_case("pdf"))
        .map(|r| r.link)
        .unwrap_or_default();
    let cited_by = item
        .inline_links
        .cited_by
        .map(|c| c.total.to_string())
        .unwrap_or_default();

    record
        .with_extra("journal", source)
        .with_extra("doi", doi.unwrap_or_default())
        .with_extra("pdf_url", pdf_url)
        .with_extra("cited_by", cited_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublicationDate;

    const RESPONSE: &str = r#"{
        "search_metadata": {"status": "Success"},
        "organic_results": [
            {
                "position": 0,
                "title": "CRISPR  gene drives in mosquitoes",
                "result_id": "AbC123xyz",
                "link": "https://www.nature.com/articles/10.1038/nbt.3439",
                "snippet": "We describe a gene drive system ...",
                "publication_info": {
                    "summary": "VM Gantz, E Bier - Nature Biotechnology, 2016 - nature.com",
                    "authors": [{"name": "VM Gantz", "link": "https://x"}, {"name": "E Bier"}]
                },
                "resources": [{"title": "nature.com", "file_format": "PDF", "link": "https://x/p.pdf"}],
                "inline_links": {"cited_by": {"total": 412}}
            },
            {
                "position": 1,
                "title": "Malaria control review",
                "link": "https://example.org/review",
                "snippet": "",
                "publication_info": {"summary": "A Roe, B Poe - Malaria Journal, 2019 - Springer"}
            },
            {"position": 2, "title": "", "link": "https://example.org/blank"}
        ]
    }"#;

    fn client(key: Option<&str>) -> Result<ScholarClient> {
        let config = ScholarConfig {
            api_key: key.map(str::to_string),
            ..ScholarConfig::default()
        };
        ScholarClient::new(reqwest::Client::new(), &config, RetryPolicy::none())
    }

    #[test]
    fn test_parse_results() {
        let records = parse_results(RESPONSE).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.external_id, "AbC123xyz");
        assert_eq!(first.title, "CRISPR gene drives in mosquitoes");
        assert_eq!(first.authors, vec!["VM Gantz", "E Bier"]);
        assert_eq!(first.publication_date, Some(PublicationDate::Year(2016)));
        assert_eq!(first.extra["journal"], "Nature Biotechnology");
        assert_eq!(first.extra["doi"], "10.1038/nbt.3439");
        assert_eq!(first.extra["pdf_url"], "https://x/p.pdf");
        assert_eq!(first.extra["cited_by"], "412");

        let second = &records[1];
        assert_eq!(second.external_id.len(), 16);
        assert_eq!(second.authors, vec!["A Roe", "B Poe"]);
        assert!(second.abstract_text.is_none());
        assert!(!second.extra.contains_key("doi"));
    }

    #[test]
    fn test_no_results_is_empty_not_error() {
        let body = r#"{"error": "Google hasn't returned any results for this query."}"#;
        assert!(parse_results(body).unwrap().is_empty());

        let body = r#"{"error": "Invalid API key."}"#;
        assert!(matches!(parse_results(body), Err(BackendError::Malformed(_))));
    }

    #[test]
    fn test_split_native_query() {
        assert_eq!(
            split_native_query("intitle:\"malaria\" AND as_ylo:2018 as_yhi:2020 as_ylo:2024"),
            ScholarRequest {
                q: "intitle:\"malaria\"".into(),
                year_low: Some(2024),
                year_high: Some(2020),
            }
        );
        assert_eq!(split_native_query("as_ylo:2010 as_yhi:2012").q, "");
        assert_eq!(split_native_query("(dengue) OR (zika)").year_low, None);
    }

    #[test]
    fn test_page_url() {
        let client = client(Some("k")).unwrap();
        let request = split_native_query("(dengue) AND as_ylo:2019");
        let url = client.page_url(&request, 20, 20);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("engine".into(), "google_scholar".into())));
        assert!(pairs.contains(&("q".into(), "(dengue)".into())));
        assert!(pairs.contains(&("as_ylo".into(), "2019".into())));
        assert!(pairs.contains(&("start".into(), "20".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "as_yhi"));
    }

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(client(None), Err(AppError::Config(_))));
        assert!(matches!(client(Some("  ")), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_year_only_query_is_rejected() {
        let client = client(Some("k")).unwrap();
        assert!(matches!(
            client.search("as_ylo:2010 as_yhi:2011", 5).await,
            Err(BackendError::EmptyQuery)
        ));
    }
}
