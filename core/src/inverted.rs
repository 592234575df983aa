//! Index Builder: the map/reduce job producing one compact posting line per term.

use crate::codec::encode_postings;
use crate::index::{Field, PageRecord, Posting};
use crate::mapreduce::{self, Counters, Job, JobConfig, JobReport};
use crate::persist::{load_meta, save_meta};
use crate::tokenizer::tokenize;
use std::collections::HashMap;
use std::path::Path;

pub const DOCUMENTS: &str = "documents";
pub const TERMS: &str = "terms";

pub struct IndexJob;

/// Per-term postings of a single page, accumulated over its three fields.
pub fn postings_for_page(page: &PageRecord) -> HashMap<String, Posting> {
    let mut postings: HashMap<String, Posting> = HashMap::new();
    for field in Field::ALL {
        for (term, pos) in tokenize(&page.field_text(field)) {
            postings
                .entry(term)
                .or_insert_with(|| Posting::new(page.id))
                .push(field, pos as u32);
        }
    }
    postings
}

impl Job for IndexJob {
    type Key = String;
    type Value = Posting;

    fn name(&self) -> String { "inverted-index".into() }

    fn map(&self, line: &str, out: &mut Vec<(String, Posting)>) -> anyhow::Result<()> {
        let page: PageRecord = serde_json::from_str(line)?;
        out.extend(postings_for_page(&page));
        Ok(())
    }

    fn reduce(&self, term: &String, postings: Vec<Posting>, counters: &mut Counters) -> Option<String> {
        counters.incr(TERMS, 1);
        Some(format!("{term}\t{}", encode_postings(&postings)))
    }
}

/// Build the inverted index of the corpus data file(s) at `input` into `output`.
pub fn build_index(input: &Path, output: &Path, config: &JobConfig) -> crate::Result<JobReport> {
    let mut report = mapreduce::run(&IndexJob, input, output, config)?;
    let documents = report.counters.get(mapreduce::MAP_INPUT_RECORDS) - report.counters.get(mapreduce::MAP_SKIPPED_RECORDS);
    report.counters.incr(DOCUMENTS, documents);
    let mut meta = load_meta(output)?;
    meta.counters.insert(DOCUMENTS.to_string(), documents);
    save_meta(output, &meta)?;
    tracing::info!(documents, terms = report.counters.get(TERMS), output = %output.display(), "index build complete");
    Ok(report)
}
