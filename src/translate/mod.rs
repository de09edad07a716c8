//! Query translation into each backend's native syntax.
//!
//! Every backend follows the same shape and differs only in its tables:
//!
//! 1. blank terms are skipped
//! 2. each term is rendered with the backend's field tag (or untyped)
//! 3. a connective goes before every rendered term but the first
//! 4. a year range becomes a trailing date clause joined with AND
//! 5. tokens are joined with single spaces
//!
//! Translation is pure and total: a [`Query`] that was constructed is always
//! translatable.
//!
//! Saved-search re-runs may additionally be narrowed to records added since
//! the last successful check (see [`QueryTranslator::translate_since`]).

mod arxiv;
mod gim;
mod pubmed;
mod scholar;

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{Backend, Connective, Field, Query};

pub use arxiv::ArxivTranslator;
pub use gim::GimTranslator;
pub use pubmed::PubmedTranslator;
pub use scholar::ScholarTranslator;

/// Native query syntax of one backend.
pub trait QueryTranslator: Send + Sync {
    fn backend(&self) -> Backend;

    /// Field tag for this backend, `None` for an untyped term.
    ///
    /// Implementations match exhaustively on [`Field`].
    fn field_tag(&self, field: Field) -> Option<&'static str>;

    /// Render one term with its (optional) field tag.
    fn render_term(&self, text: &str, tag: Option<&'static str>) -> String;

    fn connective(&self, connective: Connective) -> &'static str;

    /// Inclusive publication-year range clause.
    fn date_clause(&self, start_year: i32, end_year: i32) -> String;

    /// Clause matching records added to the backend on or after `since`.
    fn since_clause(&self, since: NaiveDate) -> String;

    /// Append a rendered term preceded by its connective.
    fn push_term(&self, tokens: &mut Vec<String>, connective: Connective, rendered: String) {
        tokens.push(self.connective(connective).to_string());
        tokens.push(rendered);
    }

    /// Translate a whole query.
    fn translate(&self, query: &Query) -> String {
        let mut tokens: Vec<String> = Vec::new();

        for term in query.active_terms() {
            let rendered = self.render_term(term.text.trim(), self.field_tag(term.field));
            if tokens.is_empty() {
                tokens.push(rendered);
            } else {
                self.push_term(&mut tokens, term.connective.unwrap_or_default(), rendered);
            }
        }

        if let Some((start, end)) = query.year_range() {
            if !tokens.is_empty() {
                tokens.push(self.connective(Connective::And).to_string());
            }
            tokens.push(self.date_clause(start, end));
        }

        tokens.join(" ")
    }

    /// Translate, then AND the whole query with [`since_clause`](Self::since_clause).
    ///
    /// A query with nothing to translate stays empty.
    fn translate_since(&self, query: &Query, since: Option<NaiveDate>) -> String {
        let native = self.translate(query);
        match since {
            Some(since) if !native.is_empty() => format!(
                "({native}) {} {}",
                self.connective(Connective::And),
                self.since_clause(since)
            ),
            _ => native,
        }
    }
}

/// Translator for a backend.
pub fn translator_for(backend: Backend) -> &'static dyn QueryTranslator {
    match backend {
        Backend::Pubmed => &PubmedTranslator,
        Backend::Arxiv => &ArxivTranslator,
        Backend::Gim => &GimTranslator,
        Backend::Scholar => &ScholarTranslator,
    }
}

/// Translate a query for one backend.
pub fn translate(backend: Backend, query: &Query) -> String {
    translator_for(backend).translate(query)
}

/// Translate a query for one backend, restricted to records added since `since`.
pub fn translate_since(backend: Backend, query: &Query, since: Option<NaiveDate>) -> String {
    translator_for(backend).translate_since(query, since)
}

/// Translate a query for every backend it selects.
pub fn translate_all(query: &Query) -> BTreeMap<Backend, String> {
    query
        .backends()
        .iter()
        .map(|&backend| (backend, translate(backend, query)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_for(backend: Backend) -> crate::models::QueryBuilder {
        Query::builder().backend(backend)
    }

    #[test]
    fn test_title_marker_position() {
        let pubmed = query_for(Backend::Pubmed)
            .term("cancer", Field::Title)
            .build()
            .unwrap();
        assert_eq!(translate(Backend::Pubmed, &pubmed), "(cancer[Title])");

        let arxiv = query_for(Backend::Arxiv)
            .term("cancer", Field::Title)
            .build()
            .unwrap();
        assert_eq!(translate(Backend::Arxiv, &arxiv), "ti:\"cancer\"");

        let gim = query_for(Backend::Gim)
            .term("cancer", Field::Title)
            .build()
            .unwrap();
        assert_eq!(translate(Backend::Gim, &gim), "ti:(cancer)");
    }

    #[test]
    fn test_date_range_alone() {
        for backend in Backend::ALL {
            let query = query_for(backend).years(2010, 2020).build().unwrap();
            let native = translate(backend, &query);
            assert_eq!(native, translator_for(backend).date_clause(2010, 2020));
            assert!(!native.is_empty());
            assert!(!native.starts_with("AND"));
        }
    }

    #[test]
    fn test_nothing_to_translate() {
        for backend in Backend::ALL {
            let query = query_for(backend).term("   ", Field::Title).build().unwrap();
            assert_eq!(translate(backend, &query), "");
        }
    }

    #[test]
    fn test_gene_therapy_scenario() {
        let query = query_for(Backend::Pubmed)
            .and("gene therapy", Field::Any)
            .and("clinical trial", Field::Author)
            .build()
            .unwrap();
        assert_eq!(
            translate(Backend::Pubmed, &query),
            "(gene therapy) AND (clinical trial[Author])"
        );
    }

    #[test]
    fn test_first_connective_ignored_and_default_and() {
        let query = query_for(Backend::Pubmed)
            .not("malaria", Field::Any)
            .term("vaccine", Field::Title)
            .or("plasmodium", Field::Mesh)
            .build()
            .unwrap();
        assert_eq!(
            translate(Backend::Pubmed, &query),
            "(malaria) AND (vaccine[Title]) OR (plasmodium[MeSH Terms])"
        );
    }

    #[test]
    fn test_blank_first_term_does_not_leave_dangling_connective() {
        let query = query_for(Backend::Gim)
            .term(" ", Field::Any)
            .or("dengue", Field::Abstract)
            .years(2001, 2002)
            .build()
            .unwrap();
        assert_eq!(
            translate(Backend::Gim, &query),
            "ab:(dengue) AND year_cluster:[2001 TO 2002]"
        );
    }

    #[test]
    fn test_translate_all_only_selected_backends() {
        let query = Query::builder()
            .term("tuberculosis", Field::Any)
            .backends([Backend::Pubmed, Backend::Gim])
            .build()
            .unwrap();
        let all = translate_all(&query);
        assert_eq!(all.len(), 2);
        assert!(!all.contains_key(&Backend::Arxiv));
        assert_eq!(all[&Backend::Gim], "(tuberculosis)");
    }

    #[test]
    fn test_since_wraps_whole_query() {
        let query = Query::builder()
            .term("dengue", Field::Title)
            .or("zika", Field::Any)
            .backends([Backend::Pubmed, Backend::Arxiv, Backend::Gim])
            .build()
            .unwrap();
        let since = NaiveDate::from_ymd_opt(2024, 3, 9);

        assert_eq!(
            translate_since(Backend::Pubmed, &query, since),
            "((dengue[Title]) OR (zika)) AND 2024/03/09:3000[edat]"
        );
        assert_eq!(
            translate_since(Backend::Arxiv, &query, since),
            "(ti:\"dengue\" OR \"zika\") AND submittedDate:[202403090000 TO 999912312359]"
        );
        assert_eq!(
            translate_since(Backend::Gim, &query, since),
            "(ti:(dengue) OR (zika)) AND year_cluster:[2024 TO *]"
        );
        assert_eq!(
            translate_since(Backend::Gim, &query, None),
            translate(Backend::Gim, &query)
        );
    }

    #[test]
    fn test_since_leaves_empty_query_empty() {
        let query = query_for(Backend::Pubmed).term(" ", Field::Any).build().unwrap();
        let since = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(translate_since(Backend::Pubmed, &query, since), "");
    }

    #[test]
    fn test_deterministic() {
        let query = Query::builder()
            .term("a", Field::Journal)
            .or("b", Field::Keyword)
            .backends(Backend::ALL)
            .years(1990, 1999)
            .build()
            .unwrap();
        assert_eq!(translate_all(&query), translate_all(&query));
    }
}
