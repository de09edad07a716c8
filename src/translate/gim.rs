//! Global Index Medicus (BVS/iAHx) syntax: `prefix:(text)`, `year_cluster:[.. TO ..]`.

use chrono::{Datelike, NaiveDate};

use crate::models::{Backend, Connective, Field};
use crate::translate::QueryTranslator;

pub struct GimTranslator;

impl QueryTranslator for GimTranslator {
    fn backend(&self) -> Backend {
        Backend::Gim
    }

    fn field_tag(&self, field: Field) -> Option<&'static str> {
        match field {
            Field::Any => None,
            Field::Title => Some("ti"),
            Field::TitleAbstract => Some("tw"),
            Field::Abstract => Some("ab"),
            Field::Author => Some("au"),
            Field::Journal => Some("ta"),
            Field::Keyword => Some("kw"),
            Field::Mesh => Some("mh"),
        }
    }

    fn render_term(&self, text: &str, tag: Option<&'static str>) -> String {
        match tag {
            Some(tag) => format!("{tag}:({text})"),
            None => format!("({text})"),
        }
    }

    fn connective(&self, connective: Connective) -> &'static str {
        match connective {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Not => "AND NOT",
        }
    }

    fn date_clause(&self, start_year: i32, end_year: i32) -> String {
        format!("year_cluster:[{start_year} TO {end_year}]")
    }

    fn since_clause(&self, since: NaiveDate) -> String {
        // Only year granularity is indexed.
        format!("year_cluster:[{} TO *]", since.year())
    }
}
