//! Page bodies for result presentation, looked up by title.

use crate::error::Result;
use crate::index::PageRecord;
use crate::persist::for_each_line;
use std::collections::HashMap;
use std::path::Path;

/// Source of full pages for the titles on a result page.
pub trait PageSource: Send + Sync {
    /// Pages for `titles`; titles with no page are absent from the map.
    fn pages_by_title(&self, titles: &[String]) -> HashMap<String, PageRecord>;
}

/// All pages of a corpus data file, held in memory.
#[derive(Debug, Default)]
pub struct JsonlPageSource {
    by_title: HashMap<String, PageRecord>,
}

impl JsonlPageSource {
    pub fn load(path: &Path) -> Result<Self> {
        let mut pages = Vec::new();
        let mut skipped = 0usize;
        for_each_line(path, |line| {
            if line.trim().is_empty() {
                return;
            }
            match serde_json::from_str::<PageRecord>(line) {
                Ok(page) => pages.push(page),
                Err(_) => skipped += 1,
            }
        })?;
        if skipped > 0 {
            tracing::warn!(skipped, "unparsable pages ignored");
        }
        tracing::info!(pages = pages.len(), path = %path.display(), "page source loaded");
        Ok(Self::from_pages(pages))
    }

    pub fn from_pages(pages: impl IntoIterator<Item = PageRecord>) -> Self {
        Self { by_title: pages.into_iter().map(|p| (p.title.clone(), p)).collect() }
    }

    pub fn len(&self) -> usize { self.by_title.len() }

    pub fn is_empty(&self) -> bool { self.by_title.is_empty() }
}

impl PageSource for JsonlPageSource {
    fn pages_by_title(&self, titles: &[String]) -> HashMap<String, PageRecord> {
        titles
            .iter()
            .filter_map(|t| self.by_title.get(t).map(|p| (t.clone(), p.clone())))
            .collect()
    }
}
