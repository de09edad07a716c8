// src/utils/date.rs

//! Publication date normalization.
//!
//! Backends report dates in many shapes (`2020-01-15`, `2020/01/15 00:00`,
//! `2020 Jan 15`, `2020 Jan-Feb`, RFC 3339, a bare year buried in a citation).
//! Everything is reduced to a [`PublicationDate`] at day or year granularity.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;

use crate::models::PublicationDate;

fn year_pattern() -> &'static Regex {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    YEAR.get_or_init(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").expect("valid year regex"))
}

/// Parse a free-form publication date.
pub fn parse_publication_date(raw: &str) -> Option<PublicationDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(PublicationDate::Date(dt.date_naive()));
    }

    // Drop a trailing time component ("2020/01/15 00:00").
    let date_part = text.split_whitespace().collect::<Vec<_>>();
    let candidates = [
        text.to_string(),
        date_part.first().map(|s| s.to_string()).unwrap_or_default(),
    ];
    for candidate in &candidates {
        for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y %b %d", "%d %b %Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                return Some(PublicationDate::Date(date));
            }
        }
    }

    // "2020 Jan" -> first of month
    if date_part.len() >= 2 {
        let month_text = format!("{} {} 1", date_part[0], date_part[1]);
        if let Ok(date) = NaiveDate::parse_from_str(&month_text, "%Y %b %d") {
            return Some(PublicationDate::Date(date));
        }
    }

    year_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(PublicationDate::Year)
}
