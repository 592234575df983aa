//! The mixer searcher: BM25 per field, boosted by how closely the field
//! matches the query, optionally blended with PageRank.

use super::bm25::{bm25, normalize, MatchShape, ScoringConfig};
use super::{RankedDoc, Score, SearchOutcome, Searcher};
use crate::error::Result;
use crate::index::{DocId, Field, Posting};
use crate::store::{CorpusStats, IndexStore};
use crate::tokenizer::query_terms;
use std::collections::HashMap;

/// Term → document → posting, for the terms of one query part.
type TermPostings = HashMap<String, HashMap<DocId, Posting>>;

/// One query part after normalization.
struct Query {
    terms: Vec<String>,
    frequency: HashMap<String, u32>,
    /// Whitespace tokens before normalization, comparable with stored lengths.
    word_count: usize,
}

impl Query {
    fn parse(text: &str) -> Self {
        let terms = query_terms(text);
        let mut frequency = HashMap::new();
        for term in &terms {
            *frequency.entry(term.clone()).or_insert(0) += 1;
        }
        Self { terms, frequency, word_count: text.split_whitespace().count() }
    }
}

pub struct MixerSearcher {
    store: IndexStore,
    stats: CorpusStats,
    config: ScoringConfig,
    with_page_rank: bool,
}

impl MixerSearcher {
    /// Reads the corpus statistics once; a store without them is unusable.
    pub fn new(store: IndexStore, config: ScoringConfig, with_page_rank: bool) -> Result<Self> {
        let stats = store.corpus_stats()?;
        tracing::info!(documents = stats.doc_count, with_page_rank, "mixer searcher ready");
        Ok(Self { store, stats, config, with_page_rank })
    }

    pub fn stats(&self) -> &CorpusStats { &self.stats }

    fn fetch(&self, query: &Query) -> TermPostings {
        query
            .frequency
            .keys()
            .filter_map(|term| {
                let postings = self.store.postings(term)?;
                Some((term.clone(), postings.into_iter().map(|p| (p.doc_id, p)).collect()))
            })
            .collect()
    }

    /// Finite BM25 score of every (document, term) pair in `field`.
    fn term_scores(&self, field: Field, query: &Query, postings: &TermPostings) -> HashMap<DocId, Vec<f64>> {
        let avg_len = self.stats.avg_doc_length[field.id()];
        let mut scores: HashMap<DocId, Vec<f64>> = HashMap::new();
        for (term, docs) in postings {
            let df = docs.values().filter(|p| p.occurs_in(field)).count() as f64;
            let qf = query.frequency.get(term).copied().unwrap_or(1) as f64;
            for (&doc_id, posting) in docs {
                if !posting.occurs_in(field) {
                    continue;
                }
                let Some(doc_len) = self.store.doc_length(doc_id, field) else {
                    tracing::debug!(doc_id, field = field.id(), "document length missing");
                    continue;
                };
                let tf = posting.frequency[field.id()] as f64;
                let score = bm25(&self.config.bm25, self.stats.doc_count, tf, qf, df, doc_len as f64, avg_len);
                if score.is_finite() {
                    scores.entry(doc_id).or_default().push(score);
                }
            }
        }
        scores
    }

    /// Every consecutive query term pair is adjacent somewhere in the field.
    fn in_order(field: Field, doc_id: DocId, query: &Query, postings: &TermPostings) -> bool {
        let positions = |term: &str| {
            postings
                .get(term)
                .and_then(|docs| docs.get(&doc_id))
                .map(|p| &p.position[field.id()])
        };
        query.terms.windows(2).all(|pair| match (positions(pair[0].as_str()), positions(pair[1].as_str())) {
            (Some(prev), Some(next)) => prev.iter().any(|p| next.contains(&(p + 1))),
            _ => false,
        })
    }

    fn shape(&self, field: Field, doc_id: DocId, matched: usize, query: &Query, postings: &TermPostings) -> MatchShape {
        if matched < query.frequency.len() {
            return MatchShape::Partial;
        }
        if !Self::in_order(field, doc_id, query, postings) {
            return MatchShape::AllOccur;
        }
        match self.store.doc_length(doc_id, field) {
            Some(len) if len == query.word_count => MatchShape::Exact,
            _ => MatchShape::Order,
        }
    }

    /// Boosted field score of every document with at least one scored term.
    fn field_scores(&self, field: Field, query: &Query, postings: &TermPostings) -> HashMap<DocId, f64> {
        let boosts = self.config.boosts(field);
        self.term_scores(field, query, postings)
            .into_iter()
            .map(|(doc_id, scores)| {
                let shape = self.shape(field, doc_id, scores.len(), query, postings);
                (doc_id, scores.iter().sum::<f64>() * boosts.boost(shape))
            })
            .collect()
    }

    fn blend(&self, scores: HashMap<DocId, f64>) -> Vec<(DocId, Score)> {
        if !self.with_page_rank {
            return scores.into_iter().map(|(doc_id, s)| (doc_id, Score::plain(s))).collect();
        }
        let config = &self.config;
        let (min, max) = scores
            .values()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let default_rank = 1.0 / self.stats.doc_count;
        scores
            .into_iter()
            .map(|(doc_id, s)| {
                let bm25 = normalize(s, min, max, 0.0, config.bm25_scale);
                let rank = self.store.page_rank(doc_id).unwrap_or(default_rank);
                let page_rank = normalize(rank, 0.0, self.stats.max_page_rank, 0.0, config.page_rank_scale);
                let total = config.bm25_weight * bm25 + config.page_rank_weight * page_rank;
                (doc_id, Score { total, bm25, page_rank: Some(page_rank) })
            })
            .collect()
    }
}

/// Keep documents scored in both maps, summing their scores.
fn require_both(left: HashMap<DocId, f64>, right: &HashMap<DocId, f64>) -> HashMap<DocId, f64> {
    left.into_iter()
        .filter_map(|(doc_id, s)| right.get(&doc_id).map(|r| (doc_id, s + r)))
        .collect()
}

impl Searcher for MixerSearcher {
    fn search_internal(&self, keyword: &str, category: &str) -> SearchOutcome {
        let query = Query::parse(keyword);
        if query.terms.is_empty() {
            return SearchOutcome::default();
        }
        let postings = self.fetch(&query);
        if postings.is_empty() {
            return SearchOutcome::default();
        }

        let title = self.field_scores(Field::Title, &query, &postings);
        let content = self.field_scores(Field::Content, &query, &postings);
        let mut combined = require_both(title, &content);

        if !category.trim().is_empty() {
            let category_query = Query::parse(category);
            let category_postings = self.fetch(&category_query);
            let categories = self.field_scores(Field::Categories, &category_query, &category_postings);
            combined = require_both(combined, &categories);
        }

        let hits = combined.len();
        let mut ranked = self.blend(combined);
        ranked.sort_by(|a, b| b.1.total.total_cmp(&a.1.total).then(a.0.cmp(&b.0)));
        ranked.truncate(self.config.max_results);

        let ranked = ranked
            .into_iter()
            .filter_map(|(doc_id, score)| match self.store.title(doc_id) {
                Some(title) => Some(RankedDoc { doc_id, title, score }),
                None => {
                    tracing::warn!(doc_id, "ranked document has no stored title");
                    None
                }
            })
            .collect();
        tracing::debug!(keyword, category, hits, "query scored");
        SearchOutcome { hits, ranked }
    }

    fn page_size(&self) -> usize { self.config.page_size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PageRecord;
    use crate::inverted::postings_for_page;
    use crate::search::JsonlPageSource;
    use crate::tokenizer::field_length;
    use std::collections::BTreeMap;

    fn page(id: DocId, title: &str, content: &str, categories: &[&str]) -> PageRecord {
        PageRecord {
            id,
            title: title.into(),
            content: content.into(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            last_modified: None,
        }
    }

    /// A store holding exactly what the loaders would write for `pages`.
    fn indexed(pages: &[PageRecord], ranks: &[(DocId, f64)]) -> IndexStore {
        let store = IndexStore::temporary().unwrap();
        let mut terms: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut totals = [0usize; 3];
        for p in pages {
            store.put_title(p.id, &p.title).unwrap();
            for (term, posting) in postings_for_page(p) {
                terms.entry(term).or_default().push(posting);
            }
            for field in Field::ALL {
                let len = field_length(&p.field_text(field));
                totals[field.id()] += len;
                store.put_doc_length(p.id, field, len).unwrap();
            }
        }
        for (term, postings) in &terms {
            store.put_postings(term, postings).unwrap();
        }
        for field in Field::ALL {
            store.put_avg_doc_length(field, totals[field.id()] as f64 / pages.len() as f64).unwrap();
        }
        store.put_doc_count(pages.len() as u64).unwrap();
        let mut max_rank: f64 = 0.0;
        for &(doc_id, rank) in ranks {
            store.put_page_rank(doc_id, rank).unwrap();
            max_rank = max_rank.max(rank);
        }
        store.put_max_page_rank(max_rank).unwrap();
        store
    }

    fn films() -> Vec<PageRecord> {
        vec![
            page(0, "The Matrix Reloaded", "matrix film", &["Science fiction"]),
            page(1, "The Matrix", "matrix film", &["Science fiction"]),
            page(2, "Toy Story Three", "toy film", &["Pixar"]),
            page(3, "Finding Nemo Again", "fish film", &["Pixar"]),
            page(4, "Cars Two Movie", "car film", &["Pixar"]),
            page(5, "Up In The Air", "air film", &["Drama"]),
        ]
    }

    fn ids(outcome: &SearchOutcome) -> Vec<DocId> {
        outcome.ranked.iter().map(|d| d.doc_id).collect()
    }

    #[test]
    fn exact_title_match_ranks_first() {
        let searcher = MixerSearcher::new(indexed(&films(), &[]), ScoringConfig::default(), false).unwrap();
        let outcome = searcher.search_internal("the matrix", "");
        assert_eq!(outcome.hits, 2);
        assert_eq!(ids(&outcome), vec![1, 0]);
        assert_eq!(outcome.ranked[0].title, "The Matrix");
        assert!(outcome.ranked[0].score.total > outcome.ranked[1].score.total);
    }

    #[test]
    fn documents_need_the_terms_in_title_and_content() {
        let mut pages = films();
        pages.push(page(6, "Matrix Algebra", "linear maps", &["Mathematics"]));
        let searcher = MixerSearcher::new(indexed(&pages, &[]), ScoringConfig::default(), false).unwrap();
        assert!(!ids(&searcher.search_internal("matrix", "")).contains(&6));
    }

    #[test]
    fn category_filter_is_a_conjunction() {
        let pages = vec![
            page(0, "Toy Story", "a story of toys", &["Pixar films"]),
            page(1, "Story of Film", "the story of cinema", &["Documentaries"]),
            page(2, "Ghost Story", "a scary story", &["Horror films"]),
            page(3, "Cars", "cars race", &["Pixar films"]),
            page(4, "Up", "balloon house", &["Pixar films"]),
            page(5, "Alien", "space horror", &["Horror films"]),
        ];
        let searcher = MixerSearcher::new(indexed(&pages, &[]), ScoringConfig::default(), false).unwrap();

        assert_eq!(searcher.search_internal("story", "").hits, 3);
        let pixar = searcher.search_internal("story", "pixar");
        assert_eq!((pixar.hits, ids(&pixar)), (1, vec![0]));
        assert_eq!(ids(&searcher.search_internal("story", "documentaries")), vec![1]);
        assert_eq!(searcher.search_internal("story", "the").hits, 0);
    }

    #[test]
    fn queries_without_terms_short_circuit() {
        let searcher = MixerSearcher::new(indexed(&films(), &[]), ScoringConfig::default(), false).unwrap();
        let none = searcher.search_internal("the of and", "");
        assert_eq!((none.hits, none.ranked.len()), (0, 0));
        assert_eq!(searcher.search_internal("zeppelin", "").hits, 0);
    }

    #[test]
    fn equal_scores_break_ties_by_doc_id() {
        let mut pages = films();
        pages.push(page(9, "Echo", "echo chamber", &[]));
        pages.push(page(7, "Echo", "echo chamber", &[]));
        let searcher = MixerSearcher::new(indexed(&pages, &[]), ScoringConfig::default(), false).unwrap();
        assert_eq!(ids(&searcher.search_internal("echo", "")), vec![7, 9]);
    }

    #[test]
    fn multi_word_queries_rank_by_match_shape() {
        let mut pages = films();
        pages.push(page(10, "New York City", "new york guide", &[]));
        pages.push(page(11, "York New City", "new york guide", &[]));
        pages.push(page(12, "New Town City", "new york guide", &[]));
        let searcher = MixerSearcher::new(indexed(&pages, &[]), ScoringConfig::default(), false).unwrap();

        let query = Query::parse("new york");
        let postings = searcher.fetch(&query);
        let matched = searcher.term_scores(Field::Title, &query, &postings);
        let shape = |doc: DocId| searcher.shape(Field::Title, doc, matched[&doc].len(), &query, &postings);
        assert_eq!(shape(10), MatchShape::Order);
        assert_eq!(shape(11), MatchShape::AllOccur);
        assert_eq!(shape(12), MatchShape::Partial);

        let outcome = searcher.search_internal("new york", "");
        assert_eq!(outcome.hits, 3);
        assert_eq!(ids(&outcome), vec![10, 11, 12]);
        let totals: Vec<f64> = outcome.ranked.iter().map(|d| d.score.total).collect();
        assert!(totals[0] > totals[1] && totals[1] > totals[2], "{totals:?}");
    }

    #[test]
    fn results_are_capped_after_counting_hits() {
        let mut pages = films();
        for id in 10..15 {
            pages.push(page(id, "Echo", "echo chamber", &[]));
        }
        let config = ScoringConfig { max_results: 3, ..Default::default() };
        let searcher = MixerSearcher::new(indexed(&pages, &[]), config, false).unwrap();

        let outcome = searcher.search_internal("echo", "");
        assert_eq!(outcome.hits, 5);
        assert_eq!(ids(&outcome), vec![10, 11, 12]);

        let results = crate::search::search(&searcher, &JsonlPageSource::default(), "echo", 2, "/");
        assert_eq!((results.hits, results.page_no, results.total_pages), (5, Some(1), Some(1)));
        assert_eq!(results.pages.map(|p| p.len()), Some(3));
    }

    #[test]
    fn page_rank_blend_is_normalized() {
        let store = indexed(&films(), &[(0, 0.6), (1, 0.1)]);
        let searcher = MixerSearcher::new(store, ScoringConfig::default(), true).unwrap();
        let outcome = searcher.search_internal("matrix", "");
        assert_eq!(outcome.hits, 2);
        for doc in &outcome.ranked {
            let rank = doc.score.page_rank.unwrap();
            assert!((0.0..=100.0).contains(&doc.score.bm25));
            assert!((0.0..=1000.0).contains(&rank));
            assert!((doc.score.total - (0.9 * doc.score.bm25 + 0.1 * rank)).abs() < 1e-9);
        }
        let top = outcome.ranked.iter().find(|d| d.doc_id == 0).unwrap();
        assert_eq!(top.score.page_rank, Some(1000.0));
    }
}
