//! Query Engine: scoring lives behind [`Searcher`]; query splitting,
//! pagination and result presentation are shared.

pub mod bm25;
pub mod highlight;
pub mod mixer;
pub mod pages;

pub use bm25::ScoringConfig;
pub use mixer::MixerSearcher;
pub use pages::{JsonlPageSource, PageSource};

use crate::index::DocId;
use serde::Serialize;
use std::fmt;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const CATEGORY_MARKER: &str = "category:";

/// Final score of one document, with its blend components when blended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub total: f64,
    pub bm25: f64,
    pub page_rank: Option<f64>,
}

impl Score {
    pub fn plain(total: f64) -> Self {
        Self { total, bm25: total, page_rank: None }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page_rank {
            None => write!(f, "{:.8}", self.total),
            Some(rank) => write!(
                f,
                "{:.8} (Normalized BM25 + Proximity: {:.8}, Normalized PageRank: {:.8})",
                self.total, self.bm25, rank
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedDoc {
    pub doc_id: DocId,
    pub title: String,
    pub score: Score,
}

/// Scored documents of one query, best first and capped.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Matching documents before the result cap.
    pub hits: usize,
    pub ranked: Vec<RankedDoc>,
}

pub trait Searcher: Send + Sync {
    /// Rank documents for already-split, lower-cased query parts.
    /// An empty `category` means no category filter.
    fn search_internal(&self, keyword: &str, category: &str) -> SearchOutcome;

    fn page_size(&self) -> usize { DEFAULT_PAGE_SIZE }
}

/// Split a raw query at the first `category:` marker into
/// lower-cased, trimmed `(keyword, category)`.
pub fn split_query(query: &str) -> (String, String) {
    let lowered = query.to_lowercase();
    match lowered.split_once(CATEGORY_MARKER) {
        Some((keyword, category)) => (keyword.trim().to_string(), category.trim().to_string()),
        None => (lowered.trim().to_string(), String::new()),
    }
}

/// The slice of a ranked list shown on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// 1-based, after clamping.
    pub page_no: usize,
    pub total_pages: usize,
    pub start: usize,
    pub end: usize,
}

/// Clamp `requested` (1-based) into the pages of `total` results.
pub fn paginate(total: usize, page_size: usize, requested: i64) -> Option<PageWindow> {
    if total == 0 || page_size == 0 {
        return None;
    }
    let total_pages = total.div_ceil(page_size);
    let page_no = requested.clamp(1, total_pages as i64) as usize;
    let start = (page_no - 1) * page_size;
    Some(PageWindow { page_no, total_pages, start, end: (start + page_size).min(total) })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryLinks {
    pub html: Vec<String>,
    pub href: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub categories: CategoryLinks,
    pub raw_categories: Vec<String>,
    pub last_modify: String,
    pub score: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_no: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<ResultEntry>>,
}

pub fn page_url(url_base: &str, title: &str) -> String {
    format!("{url_base}{}", title.replace(' ', "_"))
}

pub fn category_url(url_base: &str, category: &str) -> String {
    format!("{url_base}Category:{}", category.replace(' ', "_"))
}

/// Run `query` through `searcher` and render page `page` of the results.
pub fn search(
    searcher: &dyn Searcher,
    source: &dyn PageSource,
    query: &str,
    page: i64,
    url_base: &str,
) -> SearchResults {
    let (keyword, category) = split_query(query);
    let outcome = searcher.search_internal(&keyword, &category);
    let Some(window) = paginate(outcome.ranked.len(), searcher.page_size(), page) else {
        return SearchResults { hits: outcome.hits, page_no: None, total_pages: None, pages: None };
    };

    let shown = &outcome.ranked[window.start..window.end];
    let titles: Vec<String> = shown.iter().map(|doc| doc.title.clone()).collect();
    let found = source.pages_by_title(&titles);

    let entries = shown
        .iter()
        .map(|doc| {
            let page = found.get(&doc.title);
            let raw_categories = page.map(|p| p.categories.clone()).unwrap_or_default();
            if page.is_none() {
                tracing::warn!(doc_id = doc.doc_id, title = %doc.title, "ranked page missing from page source");
            }
            ResultEntry {
                title: highlight::highlight(&doc.title, &keyword, "b"),
                url: page_url(url_base, &doc.title),
                snippet: page.map(|p| highlight::snippet(&p.content, &keyword)).unwrap_or_default(),
                categories: CategoryLinks {
                    html: raw_categories.iter().map(|c| highlight::highlight(c, &category, "b")).collect(),
                    href: raw_categories.iter().map(|c| category_url(url_base, c)).collect(),
                },
                raw_categories,
                last_modify: page.and_then(|p| p.last_modified.clone()).unwrap_or_default(),
                score: doc.score.to_string(),
            }
        })
        .collect();

    SearchResults {
        hits: outcome.hits,
        page_no: Some(window.page_no),
        total_pages: Some(window.total_pages),
        pages: Some(entries),
    }
}
