//! BM25 term scoring and the tunable constants of the ranking formula.

use crate::index::Field;

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub k2: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, k2: 100.0, b: 0.75 }
    }
}

/// BM25 score of one term in one field of one document.
///
/// `ln((N - df + 0.5) / (df + 0.5)) + ln((k1 + 1) tf / (K + tf)) + ln((k2 + 1) qf / (k2 + qf))`
/// with `K = k1 ((1 - b) + b dl / avgdl)`. The result may be non-finite
/// (e.g. `tf == 0`); callers discard those.
pub fn bm25(params: &Bm25Params, doc_count: f64, tf: f64, qf: f64, df: f64, doc_len: f64, avg_len: f64) -> f64 {
    let Bm25Params { k1, k2, b } = *params;
    let k = k1 * ((1.0 - b) + b * doc_len / avg_len);
    let idf = ((doc_count - df + 0.5) / (df + 0.5)).ln();
    let term = ((k1 + 1.0) * tf / (k + tf)).ln();
    let query = ((k2 + 1.0) * qf / (k2 + qf)).ln();
    idf + term + query
}

/// Multipliers applied to a field's summed term scores by match shape.
#[derive(Debug, Clone, Copy)]
pub struct FieldBoosts {
    /// Terms in query order and the field is exactly as long as the query.
    pub exact: f64,
    /// Every consecutive query term pair is adjacent in the field.
    pub order: f64,
    /// Every query term occurs, not in order.
    pub all_occur: f64,
    /// Only some query terms occur.
    pub partial: f64,
    /// Field importance, applied after the shape boost.
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchShape {
    Exact,
    Order,
    AllOccur,
    Partial,
}

impl FieldBoosts {
    pub fn boost(&self, shape: MatchShape) -> f64 {
        let shaped = match shape {
            MatchShape::Exact => self.exact,
            MatchShape::Order => self.order,
            MatchShape::AllOccur => self.all_occur,
            MatchShape::Partial => self.partial,
        };
        shaped * self.weight
    }
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub bm25: Bm25Params,
    pub title: FieldBoosts,
    pub content: FieldBoosts,
    pub categories: FieldBoosts,
    pub bm25_weight: f64,
    pub page_rank_weight: f64,
    /// Upper bound of the normalized BM25 range.
    pub bm25_scale: f64,
    /// Upper bound of the normalized PageRank range.
    pub page_rank_scale: f64,
    pub max_results: usize,
    pub page_size: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let heavy = FieldBoosts { exact: 20.0, order: 10.0, all_occur: 5.0, partial: 1.0, weight: 1.0 };
        Self {
            bm25: Bm25Params::default(),
            title: heavy,
            content: FieldBoosts { exact: 2.0, order: 1.2, all_occur: 1.05, partial: 1.0, weight: 0.5 },
            categories: heavy,
            bm25_weight: 0.9,
            page_rank_weight: 0.1,
            bm25_scale: 100.0,
            page_rank_scale: 1000.0,
            max_results: 1000,
            page_size: 10,
        }
    }
}

impl ScoringConfig {
    pub fn boosts(&self, field: Field) -> &FieldBoosts {
        match field {
            Field::Title => &self.title,
            Field::Content => &self.content,
            Field::Categories => &self.categories,
        }
    }
}

/// Min-max rescale of `value` from `[min, max]` into `[new_min, new_max]`.
/// A degenerate source range maps to `new_max`.
pub fn normalize(value: f64, min: f64, max: f64, new_min: f64, new_max: f64) -> f64 {
    if min == max {
        return new_max;
    }
    (value - min) / (max - min) * (new_max - new_min) + new_min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_decreasing_in_term_frequency() {
        let params = Bm25Params::default();
        let scores: Vec<f64> = (1..=30)
            .map(|tf| bm25(&params, 1000.0, tf as f64, 1.0, 10.0, 120.0, 80.0))
            .collect();
        assert!(scores.iter().all(|s| s.is_finite()));
        assert!(scores.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn zero_frequency_is_not_finite() {
        let s = bm25(&Bm25Params::default(), 10.0, 0.0, 1.0, 2.0, 5.0, 5.0);
        assert!(!s.is_finite());
    }

    #[test]
    fn rarer_terms_score_higher() {
        let p = Bm25Params::default();
        let rare = bm25(&p, 100.0, 2.0, 1.0, 3.0, 10.0, 10.0);
        let common = bm25(&p, 100.0, 2.0, 1.0, 40.0, 10.0, 10.0);
        assert!(rare > common);
    }

    #[test]
    fn normalize_ranges() {
        assert_eq!(normalize(5.0, 0.0, 10.0, 0.0, 100.0), 50.0);
        assert_eq!(normalize(3.0, 3.0, 3.0, 0.0, 100.0), 100.0);
        assert_eq!(ScoringConfig::default().content.boost(MatchShape::Exact), 1.0);
    }
}
