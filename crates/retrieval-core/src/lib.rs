//! Shared building blocks for the hybrid retrieval engine: configuration,
//! errors, domain types, the embedder contract, the chunker and the
//! document loader.

pub mod chunker;
pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::Chunker;
pub use config::{ChunkingConfig, LexicalConfig, RetrievalConfig};
pub use error::{Error, Result};
pub use loader::DocumentLoader;
pub use traits::Embedder;
pub use types::{Chunk, ChunkId, Coverage, Document, DocumentFormat, RetrievalHit, RetrievalResult, SearchHit, SourceKind};
