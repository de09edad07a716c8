// src/backends/pubmed.rs

//! NCBI E-utilities client: `esearch` for PMIDs, then `esummary` for metadata.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::backends::{BackendClient, BackendError, require_query};
use crate::error::Result;
use crate::models::{Backend, PubmedConfig, ResultRecord};
use crate::utils::date::parse_publication_date;
use crate::utils::http::{RetryPolicy, fetch_text, with_retry};
use crate::utils::normalize_whitespace;

const ARTICLE_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";

pub struct PubmedClient {
    http: reqwest::Client,
    esearch_url: Url,
    esummary_url: Url,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl PubmedClient {
    pub fn new(http: reqwest::Client, config: &PubmedConfig, retry: RetryPolicy) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            http,
            esearch_url: Url::parse(&format!("{base}/esearch.fcgi"))?,
            esummary_url: Url::parse(&format!("{base}/esummary.fcgi"))?,
            api_key: config.api_key.clone(),
            retry,
        })
    }

    fn search_url(&self, term: &str, max_results: u32) -> Url {
        let mut url = self.esearch_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("db", "pubmed")
                .append_pair("term", term)
                .append_pair("retmode", "json")
                .append_pair("retmax", &max_results.to_string())
                .append_pair("sort", "pub_date");
            if let Some(key) = &self.api_key {
                pairs.append_pair("api_key", key);
            }
        }
        url
    }

    fn summary_url(&self, pmids: &[String]) -> Url {
        let mut url = self.esummary_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("db", "pubmed")
                .append_pair("id", &pmids.join(","))
                .append_pair("retmode", "json");
            if let Some(key) = &self.api_key {
                pairs.append_pair("api_key", key);
            }
        }
        url
    }
}

#[async_trait]
impl BackendClient for PubmedClient {
    fn backend(&self) -> Backend {
        Backend::Pubmed
    }

    async fn search(
        &self,
        native_query: &str,
        max_results: u32,
    ) -> std::result::Result<Vec<ResultRecord>, BackendError> {
        let term = require_query(native_query)?;

        let search_url = self.search_url(term, max_results);
        let body = with_retry(self.retry, "pubmed esearch", || {
            fetch_text(&self.http, search_url.clone())
        })
        .await?;
        let pmids = parse_search_ids(&body)?;

        if pmids.is_empty() {
            log::info!("PubMed: no ids for query {}", term);
            return Ok(Vec::new());
        }
        log::debug!("PubMed: {} ids, fetching summaries", pmids.len());

        let summary_url = self.summary_url(&pmids);
        let body = with_retry(self.retry, "pubmed esummary", || {
            fetch_text(&self.http, summary_url.clone())
        })
        .await?;

        let mut records = parse_summaries(&body)?;
        records.truncate(max_results as usize);
        Ok(records)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocSummary {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<SummaryAuthor>,
    #[serde(default)]
    fulljournalname: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    sortpubdate: String,
    #[serde(default)]
    articleids: Vec<ArticleId>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryAuthor {
    name: String,
    #[serde(default)]
    authtype: String,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    idtype: String,
    value: String,
}

/// Extract the PMID list from an esearch JSON body.
fn parse_search_ids(body: &str) -> std::result::Result<Vec<String>, BackendError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::malformed(format!("esearch: {e}")))?;

    if let Some(error) = response.esearchresult.error {
        return Err(BackendError::malformed(format!("esearch: {error}")));
    }
    Ok(response.esearchresult.idlist)
}

/// Turn an esummary JSON body into records, in the order of its `uids` list.
fn parse_summaries(body: &str) -> std::result::Result<Vec<ResultRecord>, BackendError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| BackendError::malformed(format!("esummary: {e}")))?;

    let result = value
        .get("result")
        .and_then(|r| r.as_object())
        .ok_or_else(|| BackendError::malformed("esummary: missing result object"))?;

    let uids: Vec<String> = match result.get("uids") {
        Some(uids) => serde_json::from_value(uids.clone())
            .map_err(|e| BackendError::malformed(format!("esummary uids: {e}")))?,
        None => Vec::new(),
    };

    let mut records = Vec::with_capacity(uids.len());
    for uid in &uids {
        let Some(raw) = result.get(uid) else {
            log::warn!("PubMed: summary for {} missing", uid);
            continue;
        };
        let doc: DocSummary = match serde_json::from_value(raw.clone()) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("PubMed: skipping unparsable summary {}: {}", uid, e);
                continue;
            }
        };
        if let Some(error) = &doc.error {
            log::warn!("PubMed: summary {} reported error: {}", uid, error);
            continue;
        }
        records.push(doc_to_record(uid, doc));
    }
    Ok(records)
}

fn doc_to_record(uid: &str, doc: DocSummary) -> ResultRecord {
    let pmid = if doc.uid.is_empty() { uid.to_string() } else { doc.uid };
    let url = format!("{ARTICLE_BASE}/{pmid}/");

    let mut record = ResultRecord::new(Backend::Pubmed, pmid, normalize_whitespace(&doc.title), url);
    record.authors = doc
        .authors
        .into_iter()
        .filter(|a| a.authtype.is_empty() || a.authtype.eq_ignore_ascii_case("author"))
        .map(|a| a.name)
        .collect();
    record.publication_date =
        parse_publication_date(&doc.pubdate).or_else(|| parse_publication_date(&doc.sortpubdate));

    let journal = if doc.fulljournalname.is_empty() {
        doc.source
    } else {
        doc.fulljournalname
    };
    let doi = doc
        .articleids
        .into_iter()
        .find(|id| id.idtype == "doi")
        .map(|id| id.value)
        .unwrap_or_default();

    record.with_extra("journal", journal).with_extra("doi", doi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublicationDate;
    use chrono::NaiveDate;

    const ESEARCH: &str = r#"{
        "header": {"type": "esearch", "version": "0.3"},
        "esearchresult": {"count": "2", "retmax": "2", "retstart": "0",
            "idlist": ["38000001", "37999999"]}
    }"#;

    const ESUMMARY: &str = r#"{
        "header": {"type": "esummary", "version": "0.3"},
        "result": {
            "uids": ["38000001", "37999999"],
            "38000001": {
                "uid": "38000001",
                "pubdate": "2023 Nov 20",
                "source": "Lancet",
                "authors": [
                    {"name": "Smith J", "authtype": "Author"},
                    {"name": "Doe A", "authtype": "Author"},
                    {"name": "Trial Group", "authtype": "CollectiveName"}
                ],
                "title": "Gene therapy in   practice.",
                "fulljournalname": "Lancet (London, England)",
                "articleids": [
                    {"idtype": "pubmed", "value": "38000001"},
                    {"idtype": "doi", "value": "10.1016/x.2023.1"}
                ],
                "sortpubdate": "2023/11/20 00:00"
            },
            "37999999": {
                "uid": "37999999",
                "pubdate": "2023 Winter",
                "source": "J Rare Dis",
                "authors": [],
                "title": "Second paper",
                "articleids": [],
                "sortpubdate": "2023/12/01 00:00"
            }
        }
    }"#;

    #[test]
    fn test_parse_search_ids() {
        assert_eq!(
            parse_search_ids(ESEARCH).unwrap(),
            vec!["38000001", "37999999"]
        );
    }

    #[test]
    fn test_parse_search_error() {
        let body = r#"{"esearchresult": {"ERROR": "Invalid query"}}"#;
        assert!(matches!(
            parse_search_ids(body),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(
            parse_search_ids("<html>"),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_summaries() {
        let records = parse_summaries(ESUMMARY).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.external_id, "38000001");
        assert_eq!(first.title, "Gene therapy in practice.");
        assert_eq!(first.url, "https://pubmed.ncbi.nlm.nih.gov/38000001/");
        assert_eq!(first.authors, vec!["Smith J", "Doe A"]);
        assert_eq!(
            first.publication_date,
            Some(PublicationDate::Date(
                NaiveDate::from_ymd_opt(2023, 11, 20).unwrap()
            ))
        );
        assert_eq!(first.extra["journal"], "Lancet (London, England)");
        assert_eq!(first.extra["doi"], "10.1016/x.2023.1");

        let second = &records[1];
        assert_eq!(second.extra["journal"], "J Rare Dis");
        assert!(!second.extra.contains_key("doi"));
        assert_eq!(second.publication_date, Some(PublicationDate::Year(2023)));
    }

    #[test]
    fn test_summary_without_result_is_malformed() {
        assert!(matches!(
            parse_summaries(r#"{"header": {}}"#),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn test_search_url_carries_api_key() {
        let config = PubmedConfig {
            api_key: Some("secret".into()),
            ..PubmedConfig::default()
        };
        let client = PubmedClient::new(reqwest::Client::new(), &config, RetryPolicy::none()).unwrap();
        let url = client.search_url("(cancer[Title])", 10);

        assert!(url.as_str().starts_with(
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi?db=pubmed"
        ));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("term".into(), "(cancer[Title])".into())));
        assert!(pairs.contains(&("retmax".into(), "10".into())));
        assert!(pairs.contains(&("api_key".into(), "secret".into())));
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_network() {
        let client = PubmedClient::new(
            reqwest::Client::new(),
            &PubmedConfig::default(),
            RetryPolicy::none(),
        )
        .unwrap();
        assert!(matches!(
            client.search("   ", 5).await,
            Err(BackendError::EmptyQuery)
        ));
    }
}
