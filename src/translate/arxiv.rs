//! arXiv API query syntax: `prefix:"text"`, `ANDNOT`, `submittedDate:[.. TO ..]`.

use chrono::NaiveDate;

use crate::models::{Backend, Connective, Field};
use crate::translate::QueryTranslator;

pub struct ArxivTranslator;

impl QueryTranslator for ArxivTranslator {
    fn backend(&self) -> Backend {
        Backend::Arxiv
    }

    fn field_tag(&self, field: Field) -> Option<&'static str> {
        match field {
            Field::Title => Some("ti"),
            Field::Abstract => Some("abs"),
            Field::Author => Some("au"),
            Field::Journal => Some("jr"),
            // No combined title/abstract, keyword or MeSH index on arXiv.
            Field::Any | Field::TitleAbstract | Field::Keyword | Field::Mesh => None,
        }
    }

    fn render_term(&self, text: &str, tag: Option<&'static str>) -> String {
        let phrase = text.replace('"', "");
        match tag {
            Some(tag) => format!("{tag}:\"{phrase}\""),
            None => format!("\"{phrase}\""),
        }
    }

    fn connective(&self, connective: Connective) -> &'static str {
        match connective {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Not => "ANDNOT",
        }
    }

    fn date_clause(&self, start_year: i32, end_year: i32) -> String {
        format!("submittedDate:[{start_year}01010000 TO {end_year}12312359]")
    }

    fn since_clause(&self, since: NaiveDate) -> String {
        format!("submittedDate:[{}0000 TO 999912312359]", since.format("%Y%m%d"))
    }
}
