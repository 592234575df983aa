use serde::{Deserialize, Serialize};

pub type DocId = u32;

/// Number of indexed fields per page.
pub const FIELD_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title = 0,
    Content = 1,
    Categories = 2,
}

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [Field::Title, Field::Content, Field::Categories];

    pub fn id(self) -> usize { self as usize }
}

/// One line of the corpus data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: DocId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, rename = "lastModified")]
    pub last_modified: Option<String>,
}

impl PageRecord {
    /// Field text as indexed: lowercased, categories joined by a single space.
    pub fn field_text(&self, field: Field) -> String {
        match field {
            Field::Title => self.title.to_lowercase(),
            Field::Content => self.content.to_lowercase(),
            Field::Categories => self
                .categories
                .iter()
                .map(|c| c.to_lowercase())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// One line of the corpus index file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleRecord {
    pub id: DocId,
    pub title: String,
}

/// One line of the corpus link file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: DocId,
    #[serde(default)]
    pub links: Vec<DocId>,
}

/// Occurrences of one term in one document, split by field.
///
/// `position[f].len() == frequency[f]` for every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub frequency: [u32; FIELD_COUNT],
    pub position: [Vec<u32>; FIELD_COUNT],
}

impl Posting {
    pub fn new(doc_id: DocId) -> Self {
        Self { doc_id, ..Default::default() }
    }

    pub fn push(&mut self, field: Field, pos: u32) {
        self.frequency[field.id()] += 1;
        self.position[field.id()].push(pos);
    }

    pub fn occurs_in(&self, field: Field) -> bool { self.frequency[field.id()] > 0 }
}
