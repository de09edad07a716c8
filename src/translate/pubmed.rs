//! PubMed (NCBI Entrez) query syntax: `(text[Tag])`, `start:end[dp]`.

use chrono::NaiveDate;

use crate::models::{Backend, Connective, Field};
use crate::translate::QueryTranslator;

pub struct PubmedTranslator;

impl QueryTranslator for PubmedTranslator {
    fn backend(&self) -> Backend {
        Backend::Pubmed
    }

    fn field_tag(&self, field: Field) -> Option<&'static str> {
        match field {
            Field::Any => None,
            Field::Title => Some("Title"),
            Field::TitleAbstract => Some("Title/Abstract"),
            Field::Abstract => Some("Abstract"),
            Field::Author => Some("Author"),
            Field::Journal => Some("Journal"),
            Field::Keyword => Some("Other Term"),
            Field::Mesh => Some("MeSH Terms"),
        }
    }

    fn render_term(&self, text: &str, tag: Option<&'static str>) -> String {
        match tag {
            Some(tag) => format!("({text}[{tag}])"),
            None => format!("({text})"),
        }
    }

    fn connective(&self, connective: Connective) -> &'static str {
        match connective {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Not => "NOT",
        }
    }

    fn date_clause(&self, start_year: i32, end_year: i32) -> String {
        format!("{start_year}:{end_year}[dp]")
    }

    fn since_clause(&self, since: NaiveDate) -> String {
        // Entrez date: when the record entered PubMed, not when it was published.
        format!("{}:3000[edat]", since.format("%Y/%m/%d"))
    }
}
