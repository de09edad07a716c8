// src/backends/arxiv.rs

//! arXiv export API client. Responses are Atom feeds, read with `scraper`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::backends::{BackendClient, BackendError, require_query};
use crate::error::Result;
use crate::models::{ArxivConfig, Backend, ResultRecord};
use crate::utils::date::parse_publication_date;
use crate::utils::http::{RetryPolicy, fetch_text, with_retry};
use crate::utils::normalize_whitespace;

pub struct ArxivClient {
    http: reqwest::Client,
    endpoint: Url,
    retry: RetryPolicy,
}

impl ArxivClient {
    pub fn new(http: reqwest::Client, config: &ArxivConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http,
            endpoint: Url::parse(&config.base_url)?,
            retry,
        })
    }

    fn query_url(&self, search_query: &str, max_results: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("search_query", search_query)
            .append_pair("start", "0")
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "submittedDate")
            .append_pair("sortOrder", "descending");
        url
    }
}

#[async_trait]
impl BackendClient for ArxivClient {
    fn backend(&self) -> Backend {
        Backend::Arxiv
    }

    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> std::result::Result<Vec<ResultRecord>, BackendError> {
        let search_query = require_query(native_query)?;
        let url = self.query_url(search_query, max_results);

        let body = with_retry(self.retry, "arxiv query", || {
            fetch_text(&self.http, url.clone())
        })
        .await?;

        let mut records = parse_feed(&body)?;
        records.truncate(max_results as usize);
        log::debug!("arXiv: {} entries", records.len());
        Ok(records)
    }
}

struct FeedSelectors {
    feed: Selector,
    entry: Selector,
    title: Selector,
    id: Selector,
    summary: Selector,
    published: Selector,
    author_name: Selector,
    alternate: Selector,
    pdf: Selector,
}

fn selectors() -> &'static FeedSelectors {
    static SELECTORS: OnceLock<FeedSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let parse = |s: &str| Selector::parse(s).expect("static selector");
        FeedSelectors {
            feed: parse("feed"),
            entry: parse("entry"),
            title: parse("title"),
            id: parse("id"),
            summary: parse("summary"),
            published: parse("published"),
            author_name: parse("author > name"),
            alternate: parse(r#"link[rel="alternate"]"#),
            pdf: parse(r#"link[title="pdf"]"#),
        }
    })
}

fn version_suffix() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| Regex::new(r"v\d+$").expect("valid version regex"))
}

fn text_of(element: &ElementRef, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

/// `http://arxiv.org/abs/2101.00001v2` -> `2101.00001`; old-style ids keep their archive prefix.
fn arxiv_id(id_url: &str) -> String {
    let tail = id_url
        .split_once("/abs/")
        .map(|(_, rest)| rest)
        .or_else(|| id_url.rsplit('/').next())
        .unwrap_or(id_url);
    version_suffix().replace(tail, "").into_owned()
}

/// Parse an Atom feed body into records.
fn parse_feed(body: &str) -> std::result::Result<Vec<ResultRecord>, BackendError> {
    let document = Html::parse_document(body);
    let sel = selectors();

    if document.select(&sel.feed).next().is_none() {
        return Err(BackendError::malformed("arxiv: response is not an Atom feed"));
    }

    let mut records = Vec::new();
    for entry in document.select(&sel.entry) {
        let Some(id_url) = text_of(&entry, &sel.id) else {
            log::warn!("arXiv: entry without id skipped");
            continue;
        };

        // The API reports query errors as a single feed entry.
        if id_url.contains("/api/errors") {
            let reason = text_of(&entry, &sel.summary).unwrap_or(id_url);
            return Err(BackendError::malformed(format!("arxiv: {reason}")));
        }

        let title = text_of(&entry, &sel.title).unwrap_or_default();
        let url = entry
            .select(&sel.alternate)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(str::to_string)
            .unwrap_or_else(|| id_url.clone());

        let mut record = ResultRecord::new(Backend::Arxiv, arxiv_id(&id_url), title, url);
        record.authors = entry
            .select(&sel.author_name)
            .map(|name| normalize_whitespace(&name.text().collect::<String>()))
            .filter(|name| !name.is_empty())
            .collect();
        record.abstract_text = text_of(&entry, &sel.summary);
        record.publication_date = text_of(&entry, &sel.published)
            .as_deref()
            .and_then(parse_publication_date);

        let pdf = entry
            .select(&sel.pdf)
            .next()
            .and_then(|link| link.value().attr("href"))
            .unwrap_or_default();
        records.push(record.with_extra("pdf_url", pdf));
    }

    Ok(records)
}
