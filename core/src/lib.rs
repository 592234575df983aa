//! Core of the mixer search engine: indexing and ranking jobs, the shared
//! key-value store and the query engine.

pub mod codec;
pub mod error;
pub mod importer;
pub mod index;
pub mod inverted;
pub mod mapreduce;
pub mod pagerank;
pub mod persist;
pub mod search;
pub mod store;
pub mod tokenizer;

pub use error::{CodecError, Error, Result};
pub use index::*;
pub use store::IndexStore;
