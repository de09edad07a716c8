//! Google Scholar (SerpAPI) syntax: `operator:"text"`, `-term` for NOT.
//!
//! Year limits are not part of Google's query language. They are written as
//! `as_ylo:YYYY` / `as_yhi:YYYY` tokens that the Scholar client lifts out of
//! the string into SerpAPI request parameters.

use chrono::{Datelike, NaiveDate};

use crate::models::{Backend, Connective, Field, Query};
use crate::translate::QueryTranslator;

pub struct ScholarTranslator;

impl QueryTranslator for ScholarTranslator {
    fn backend(&self) -> Backend {
        Backend::Scholar
    }

    fn field_tag(&self, field: Field) -> Option<&'static str> {
        match field {
            Field::Title => Some("intitle"),
            Field::Author => Some("author"),
            Field::Journal => Some("source"),
            Field::Any | Field::TitleAbstract | Field::Abstract | Field::Keyword | Field::Mesh => {
                None
            }
        }
    }

    fn render_term(&self, text: &str, tag: Option<&'static str>) -> String {
        match tag {
            Some(tag) => format!("{tag}:\"{}\"", text.replace('"', "")),
            None => format!("({text})"),
        }
    }

    fn connective(&self, connective: Connective) -> &'static str {
        match connective {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Not => "-",
        }
    }

    fn push_term(&self, tokens: &mut Vec<String>, connective: Connective, rendered: String) {
        match connective {
            Connective::Not => tokens.push(format!("-{rendered}")),
            Connective::And | Connective::Or => {
                tokens.push(self.connective(connective).to_string());
                tokens.push(rendered);
            }
        }
    }

    fn date_clause(&self, start_year: i32, end_year: i32) -> String {
        format!("as_ylo:{start_year} as_yhi:{end_year}")
    }

    fn since_clause(&self, since: NaiveDate) -> String {
        format!("as_ylo:{}", since.year())
    }

    fn translate_since(&self, query: &Query, since: Option<NaiveDate>) -> String {
        let native = self.translate(query);
        match since {
            Some(since) if !native.is_empty() => format!("{native} {}", self.since_clause(since)),
            _ => native,
        }
    }
}
