// src/backends/gim.rs

//! WHO Global Index Medicus client.
//!
//! The BVS portal has no JSON API, so the summary result page is fetched and
//! scraped with the CSS selectors from `[backends.gim.selectors]`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::backends::{BackendClient, BackendError, require_query};
use crate::error::{AppError, Result};
use crate::models::{Backend, GimConfig, ResultRecord};
use crate::utils::date::parse_publication_date;
use crate::utils::http::{RetryPolicy, fetch_text, with_retry};
use crate::utils::{normalize_whitespace, resolve_url, stable_id};

/// Titles shorter than this are navigation debris, not records.
const MIN_TITLE_LEN: usize = 5;

struct ResultSelectors {
    record: Selector,
    title: Selector,
    author: Selector,
    abstract_text: Selector,
    source: Selector,
    doc_id: Selector,
}

pub struct GimClient {
    http: reqwest::Client,
    endpoint: Url,
    selectors: ResultSelectors,
    retry: RetryPolicy,
}

impl GimClient {
    pub fn new(http: reqwest::Client, config: &GimConfig, retry: RetryPolicy) -> Result<Self> {
        let s = &config.selectors;
        let selectors = ResultSelectors {
            record: parse_selector(&s.record)?,
            title: parse_selector(&s.title)?,
            author: parse_selector(&s.author)?,
            abstract_text: parse_selector(&s.abstract_text)?,
            source: parse_selector(&s.source)?,
            doc_id: parse_selector(&s.doc_id)?,
        };

        Ok(Self {
            http,
            endpoint: Url::parse(&config.base_url)?,
            selectors,
            retry,
        })
    }

    fn search_url(&self, query: &str, max_results: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("output", "site")
            .append_pair("lang", "en")
            .append_pair("from", "0")
            .append_pair("sort", "")
            .append_pair("format", "summary")
            .append_pair("count", &max_results.to_string())
            .append_pair("fb", "")
            .append_pair("page", "1")
            .append_pair("q", query);
        url
    }

    /// Scrape records out of a result page.
    fn parse_page(&self, html: &str) -> Vec<ResultRecord> {
        let document = Html::parse_document(html);
        let sel = &self.selectors;

        let records: Vec<ResultRecord> = document
            .select(&sel.record)
            .filter_map(|row| self.parse_row(&row))
            .collect();

        if records.is_empty() {
            log::info!("GIM: no result rows on page");
        }
        records
    }

    fn parse_row(&self, row: &ElementRef) -> Option<ResultRecord> {
        let sel = &self.selectors;
        let title_elem = row.select(&sel.title).next()?;
        let title = normalize_whitespace(&title_elem.text().collect::<String>());
        if title.chars().count() < MIN_TITLE_LEN {
            log::debug!("GIM: skipping row with title {:?}", title);
            return None;
        }

        let href = title_elem.value().attr("href").unwrap_or_default();
        let url = if href.is_empty() {
            String::new()
        } else {
            resolve_url(&self.endpoint, href)
        };

        let external_id = element_text(row, &sel.doc_id)
            .or_else(|| id_from_link(&url))
            .unwrap_or_else(|| stable_id(&[title.as_str(), url.as_str()]));

        let mut record = ResultRecord::new(Backend::Gim, external_id, title, url);
        record.authors = row
            .select(&sel.author)
            .map(|a| normalize_whitespace(&a.text().collect::<String>()))
            .filter(|a| !a.is_empty())
            .collect();
        record.abstract_text =
            element_text(row, &sel.abstract_text).map(|text| strip_abstract_label(&text));

        let source = element_text(row, &sel.source).unwrap_or_default();
        record.publication_date = parse_publication_date(&source);
        let journal = source.split(';').next().unwrap_or_default().trim().to_string();

        Some(record.with_extra("journal", journal).with_extra("source", source))
    }
}

#[async_trait]
impl BackendClient for GimClient {
    fn backend(&self) -> Backend {
        Backend::Gim
    }

    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> std::result::Result<Vec<ResultRecord>, BackendError> {
        let query = require_query(native_query)?;
        let url = self.search_url(query, max_results);

        let html = with_retry(self.retry, "gim search", || {
            fetch_text(&self.http, url.clone())
        })
        .await?;

        if html.contains("CAPTCHA") {
            return Err(BackendError::RateLimited);
        }

        let mut records = self.parse_page(&html);
        records.truncate(max_results as usize);
        Ok(records)
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::config(format!("invalid GIM selector '{s}': {e:?}")))
}

fn element_text(row: &ElementRef, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

fn link_id_pattern() -> &'static Regex {
    static LINK_ID: OnceLock<Regex> = OnceLock::new();
    LINK_ID.get_or_init(|| Regex::new(r"/([a-z]+-\d+)/?$").expect("valid link id regex"))
}

/// Portal record links end in an id such as `biblio-1234567`.
fn id_from_link(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    link_id_pattern()
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn strip_abstract_label(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.get(..8) {
        Some(head) if head.eq_ignore_ascii_case("abstract") => {
            trimmed[8..].trim_start_matches([':', ' ']).to_string()
        }
        _ => trimmed.to_string(),
    }
}
