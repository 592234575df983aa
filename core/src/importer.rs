//! Store Loader: four independent bulk loaders sharing one store handle.
//!
//! Each loader owns a disjoint key namespace, so they run concurrently
//! without any locking beyond sled's own. A bad record is logged and
//! skipped; a failing loader never stops the others.

use crate::codec::{parse_index_line, RankLine};
use crate::error::Result;
use crate::index::{Field, PageRecord, TitleRecord, FIELD_COUNT};
use crate::persist::for_each_line;
use crate::store::IndexStore;
use crate::tokenizer::field_length;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const PROGRESS_EVERY: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub loader: &'static str,
    pub records: u64,
    pub skipped: u64,
    pub elapsed: Duration,
}

struct Progress {
    loader: &'static str,
    start: Instant,
    records: u64,
    skipped: u64,
}

impl Progress {
    fn start(loader: &'static str) -> Self {
        tracing::info!(loader, "loader started");
        Self { loader, start: Instant::now(), records: 0, skipped: 0 }
    }

    fn record(&mut self) {
        self.records += 1;
        if self.records % PROGRESS_EVERY == 0 {
            tracing::info!(loader = self.loader, records = self.records, elapsed = ?self.start.elapsed(), "loader progress");
        }
    }

    fn skip(&mut self, error: impl Display, line: &str) {
        self.skipped += 1;
        tracing::warn!(loader = self.loader, error = %error, record = %line, "skipping record");
    }

    /// Apply `f` to one line, ignoring the blank trailing line.
    fn apply(&mut self, line: &str, f: impl FnOnce(&str) -> anyhow::Result<()>) {
        if line.trim().is_empty() {
            return;
        }
        match f(line) {
            Ok(()) => self.record(),
            Err(e) => self.skip(e, line),
        }
    }

    fn finish(self) -> LoadSummary {
        let elapsed = self.start.elapsed();
        tracing::info!(loader = self.loader, records = self.records, skipped = self.skipped, ?elapsed, "loader finished");
        LoadSummary { loader: self.loader, records: self.records, skipped: self.skipped, elapsed }
    }
}

/// `__docId_<id>` → title, from the corpus index file.
pub fn load_titles(store: &IndexStore, path: &Path) -> Result<LoadSummary> {
    let mut progress = Progress::start("titles");
    for_each_line(path, |line| {
        progress.apply(line, |line| {
            let record: TitleRecord = serde_json::from_str(line)?;
            store.put_title(record.id, &record.title)?;
            Ok(())
        })
    })?;
    Ok(progress.finish())
}

/// `<term>` → JSON postings, from the index builder output.
pub fn load_postings(store: &IndexStore, path: &Path) -> Result<LoadSummary> {
    let mut progress = Progress::start("postings");
    for_each_line(path, |line| {
        progress.apply(line, |line| {
            let (term, postings) = parse_index_line(line)?;
            store.put_postings(&term, &postings)?;
            Ok(())
        })
    })?;
    Ok(progress.finish())
}

/// Per-field token lengths of every page, then averages and the page count.
pub fn load_lengths(store: &IndexStore, path: &Path) -> Result<LoadSummary> {
    let mut progress = Progress::start("lengths");
    let mut totals = [0u64; FIELD_COUNT];
    for_each_line(path, |line| {
        progress.apply(line, |line| {
            let page: PageRecord = serde_json::from_str(line)?;
            let mut lengths = [0usize; FIELD_COUNT];
            for field in Field::ALL {
                lengths[field.id()] = field_length(&page.field_text(field));
                store.put_doc_length(page.id, field, lengths[field.id()])?;
            }
            for (total, len) in totals.iter_mut().zip(lengths) {
                *total += len as u64;
            }
            Ok(())
        })
    })?;

    let count = progress.records;
    for field in Field::ALL {
        let total = totals[field.id()];
        let avg = if count == 0 { 0.0 } else { total as f64 / count as f64 };
        store.put_avg_doc_length(field, avg)?;
        tracing::info!(field = field.id(), avg, total, "average document length");
    }
    store.put_doc_count(count)?;
    Ok(progress.finish())
}

/// `__docPR_<id>` → rank and `__docMaxPR`, from the PageRank output.
pub fn load_page_ranks(store: &IndexStore, path: &Path) -> Result<LoadSummary> {
    let mut progress = Progress::start("pagerank");
    let mut max_rank: f64 = 0.0;
    for_each_line(path, |line| {
        progress.apply(line, |line| {
            let parsed: RankLine = line.parse()?;
            store.put_page_rank(parsed.doc_id, parsed.rank)?;
            max_rank = max_rank.max(parsed.rank);
            Ok(())
        })
    })?;
    store.put_max_page_rank(max_rank)?;
    tracing::info!(max_rank, "maximum pagerank");
    Ok(progress.finish())
}

#[derive(Debug, Clone)]
pub struct LoadPaths {
    /// Corpus data file: pages with title, content and categories.
    pub data: PathBuf,
    /// Corpus index file: id → title.
    pub index: PathBuf,
    pub postings: PathBuf,
    pub pagerank: PathBuf,
}

#[derive(Debug)]
pub struct LoadReport {
    pub outcomes: Vec<(&'static str, std::result::Result<LoadSummary, String>)>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn failed(&self) -> Vec<&'static str> {
        self.outcomes.iter().filter(|(_, o)| o.is_err()).map(|(name, _)| *name).collect()
    }
}

type Loader = fn(&IndexStore, &Path) -> Result<LoadSummary>;

/// Run the four loaders concurrently and wait for all of them.
///
/// A loader that errors or panics is reported in the outcome list; there is
/// no retry.
pub fn load_all(store: &IndexStore, paths: &LoadPaths) -> Result<LoadReport> {
    let loaders: [(&'static str, Loader, &Path); 4] = [
        ("titles", load_titles, &paths.index),
        ("postings", load_postings, &paths.postings),
        ("lengths", load_lengths, &paths.data),
        ("pagerank", load_page_ranks, &paths.pagerank),
    ];

    let outcomes = thread::scope(|s| {
        let handles: Vec<_> = loaders
            .iter()
            .map(|&(name, loader, path)| {
                let handle = thread::Builder::new()
                    .name(format!("loader-{name}"))
                    .spawn_scoped(s, move || loader(store, path));
                (name, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, handle)| {
                let outcome = match handle {
                    Err(e) => Err(format!("could not spawn loader: {e}")),
                    Ok(handle) => match handle.join() {
                        Ok(Ok(summary)) => Ok(summary),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err("loader panicked".to_string()),
                    },
                };
                if let Err(reason) = &outcome {
                    tracing::error!(loader = name, %reason, "loader failed");
                }
                (name, outcome)
            })
            .collect::<Vec<_>>()
    });

    store.flush()?;
    Ok(LoadReport { outcomes })
}
