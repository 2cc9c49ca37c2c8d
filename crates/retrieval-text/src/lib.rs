//! retrieval-text
//!
//! Sparse lexical scoring: an in-memory Okapi BM25 index whose tokenization
//! is a tantivy text analyzer (simple tokenizer, lower-casing, optional stop
//! word removal).

pub mod analyzer;
pub mod index;

pub use analyzer::{build_analyzer, tokenize};
pub use index::LexicalIndex;
