use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

lazy_static! {
    static ref EDGE_PUNCT: Regex = Regex::new(r"^[\p{P}\p{S}]+|[\p{P}\p{S}]+$").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "i","me","my","myself","we","our","ours","ourselves","you","your","yours","yourself","yourselves",
            "he","him","his","himself","she","her","hers","herself","it","its","itself",
            "they","them","their","theirs","themselves","what","which","who","whom","this","that","these","those",
            "am","is","are","was","were","be","been","being","have","has","had","having","do","does","did","doing",
            "would","should","could","ought","cannot",
            "a","an","the","and","but","if","or","because","as","until","while","of","at","by","for","with",
            "about","against","between","into","through","during","before","after","above","below","to","from",
            "up","down","in","out","on","off","over","under","again","further","then","once",
            "here","there","when","where","why","how","all","any","both","each","few","more","most",
            "other","some","such","no","nor","not","only","own","same","so","than","too","very"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Normalize one whitespace-delimited token into an index term.
///
/// Returns `None` when the token is not indexable: empty after stripping edge
/// punctuation, containing non-alphanumeric characters, or a stop-word.
pub fn normalize_token(raw: &str) -> Option<String> {
    let lowered = raw.nfkc().collect::<String>().to_lowercase();
    let token = EDGE_PUNCT.replace_all(lowered.trim(), "");
    if token.is_empty() || !token.chars().all(char::is_alphanumeric) {
        return None;
    }
    if is_stopword(&token) { return None; }
    Some(STEMMER.stem(&token).into_owned())
}

/// Tokenize text into (term, position).
///
/// Positions are offsets into the whitespace token stream *before* filtering,
/// so dropped stop-words and punctuation still advance the counter.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    text.split_whitespace()
        .enumerate()
        .filter_map(|(pos, raw)| normalize_token(raw).map(|term| (term, pos)))
        .collect()
}

/// Query terms in query order, duplicates kept.
pub fn query_terms(text: &str) -> Vec<String> {
    tokenize(text).into_iter().map(|(term, _)| term).collect()
}

/// Field length as stored in the index: plain whitespace token count.
pub fn field_length(text: &str) -> usize {
    text.split_whitespace().count()
}
