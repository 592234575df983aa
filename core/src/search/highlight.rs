//! Query-term highlighting and body snippets, shared by every searcher.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

const SNIPPET_SENTENCES: usize = 5;

lazy_static! {
    static ref SPACES: Regex = Regex::new("[ ]+").expect("valid regex");
}

/// Lowercased whitespace-separated words of a keyword string, deduplicated.
fn keyword_words(keyword: &str) -> Vec<String> {
    let mut words: Vec<String> = keyword.split_whitespace().map(|w| w.to_lowercase()).collect();
    words.sort();
    words.dedup();
    words
}

/// Wrap every case-insensitive occurrence of a keyword word in `<tag>`.
///
/// All words are matched in one pass, longest first, so inserted tags are
/// never matched again.
pub fn highlight(text: &str, keyword: &str, tag: &str) -> String {
    let mut words = keyword_words(keyword);
    if words.is_empty() {
        return text.to_string();
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()));
    let pattern = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(_) => return text.to_string(),
    };
    re.replace_all(text, |caps: &regex::Captures| format!("<{tag}>{}</{tag}>", &caps[0]))
        .into_owned()
}

/// Best sentences of `content` for `keyword`, highlighted and joined with `...`.
///
/// A sentence scores `20 * min(hits) + sum(hits)` over the keyword words,
/// where a hit is a word surrounded by spaces.
pub fn snippet(content: &str, keyword: &str) -> String {
    let words = keyword_words(keyword);
    let patterns: Vec<Regex> = words
        .iter()
        .filter_map(|w| {
            RegexBuilder::new(&format!("[ ]+{}[ ]+", regex::escape(w)))
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect();

    let mut scored: Vec<(usize, &str)> = content
        .split([',', ';', '.', '\n'])
        .filter(|s| !s.trim().is_empty())
        .map(|sentence| {
            let hits: Vec<usize> = patterns.iter().map(|p| p.find_iter(sentence).count()).collect();
            let min = hits.iter().copied().min().unwrap_or(0);
            (min * 20 + hits.iter().sum::<usize>(), sentence)
        })
        .collect();
    if scored.is_empty() {
        return String::new();
    }
    // Stable: equal scores keep document order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let parts: Vec<String> = scored
        .into_iter()
        .take(SNIPPET_SENTENCES)
        .map(|(_, sentence)| {
            let marked = highlight(sentence, keyword, "b").replace("\r\n", " ").replace(['\r', '\n'], " ");
            SPACES.replace_all(&marked, " ").into_owned()
        })
        .collect();
    format!("... {} ...", parts.join(" ... "))
}
