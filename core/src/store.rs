//! The shared key-value store: one sled database, string keys, UTF-8 values.
//!
//! Numbers are stored as their `Display` text so the database stays readable
//! with any sled tooling.

use crate::codec::{postings_from_json, postings_to_json};
use crate::error::{Error, Result};
use crate::index::{DocId, Field, Posting, FIELD_COUNT};
use std::path::Path;
use std::str::FromStr;

pub mod keys {
    use crate::index::{DocId, Field};

    pub const DOC_COUNT: &str = "__docCount";
    pub const MAX_PAGE_RANK: &str = "__docMaxPR";

    pub fn title(doc_id: DocId) -> String { format!("__docId_{doc_id}") }

    pub fn doc_length(doc_id: DocId, field: Field) -> String { format!("__docLength_{doc_id}_{}", field.id()) }

    pub fn avg_doc_length(field: Field) -> String { format!("__avgDocLength_{}", field.id()) }

    pub fn page_rank(doc_id: DocId) -> String { format!("__docPR_{doc_id}") }
}

/// Corpus-wide statistics, read once per searcher.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusStats {
    pub doc_count: f64,
    pub avg_doc_length: [f64; FIELD_COUNT],
    pub max_page_rank: f64,
}

#[derive(Clone)]
pub struct IndexStore {
    db: sled::Db,
}

impl IndexStore {
    /// Open (creating if needed) the store used by the loaders.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    /// Open a store that must already have been loaded.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::Config(format!("store {} does not exist", path.display())));
        }
        Self::open(path)
    }

    pub fn temporary() -> Result<Self> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.db.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .get(key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.get(key)?.and_then(|v| v.trim().parse().ok()))
    }

    /// Lookups on the query path: storage failures read as "not found".
    fn lookup<T: FromStr>(&self, key: &str) -> Option<T> {
        match self.get_parsed(key) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "store read failed");
                None
            }
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn put_title(&self, doc_id: DocId, title: &str) -> Result<()> {
        self.put(&keys::title(doc_id), title)
    }

    pub fn title(&self, doc_id: DocId) -> Option<String> {
        self.lookup(&keys::title(doc_id))
    }

    pub fn put_postings(&self, term: &str, postings: &[Posting]) -> Result<()> {
        self.put(term, &postings_to_json(postings)?)
    }

    /// Postings of `term`; a missing or malformed value is "no postings".
    pub fn postings(&self, term: &str) -> Option<Vec<Posting>> {
        let raw = match self.get(term) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(term, error = %e, "store read failed");
                return None;
            }
        };
        match postings_from_json(&raw) {
            Ok(postings) => Some(postings),
            Err(e) => {
                tracing::warn!(term, error = %e, "malformed stored postings");
                None
            }
        }
    }

    pub fn put_doc_length(&self, doc_id: DocId, field: Field, length: usize) -> Result<()> {
        self.put(&keys::doc_length(doc_id, field), &length.to_string())
    }

    pub fn doc_length(&self, doc_id: DocId, field: Field) -> Option<usize> {
        self.lookup(&keys::doc_length(doc_id, field))
    }

    pub fn put_avg_doc_length(&self, field: Field, avg: f64) -> Result<()> {
        self.put(&keys::avg_doc_length(field), &avg.to_string())
    }

    pub fn put_doc_count(&self, count: u64) -> Result<()> {
        self.put(keys::DOC_COUNT, &count.to_string())
    }

    pub fn put_page_rank(&self, doc_id: DocId, rank: f64) -> Result<()> {
        self.put(&keys::page_rank(doc_id), &rank.to_string())
    }

    pub fn page_rank(&self, doc_id: DocId) -> Option<f64> {
        self.lookup(&keys::page_rank(doc_id))
    }

    pub fn put_max_page_rank(&self, rank: f64) -> Result<()> {
        self.put(keys::MAX_PAGE_RANK, &rank.to_string())
    }

    fn require<T: FromStr>(&self, key: &str) -> Result<T> {
        self.get_parsed(key)?.ok_or_else(|| Error::MissingKey(key.to_string()))
    }

    pub fn corpus_stats(&self) -> Result<CorpusStats> {
        let mut avg_doc_length = [0.0; FIELD_COUNT];
        for field in Field::ALL {
            avg_doc_length[field.id()] = self.require(&keys::avg_doc_length(field))?;
        }
        Ok(CorpusStats {
            doc_count: self.require(keys::DOC_COUNT)?,
            avg_doc_length,
            max_page_rank: self.require(keys::MAX_PAGE_RANK)?,
        })
    }
}
