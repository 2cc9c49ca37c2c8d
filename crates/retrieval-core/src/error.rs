use thiserror::Error;

use crate::types::ChunkId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Session is not ready: build() has not completed")]
    NotReady,

    #[error("Session is already built; construct a new session for a new corpus")]
    AlreadyBuilt,

    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index is empty")]
    EmptyIndex,

    #[error("Corpus mismatch: {chunks} chunks but {vectors} vectors")]
    CorpusMismatch { chunks: usize, vectors: usize },

    #[error("Unknown chunk id {0}")]
    UnknownChunk(ChunkId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Render an external embedder failure, keeping its cause chain.
    pub fn embedding(err: &anyhow::Error) -> Self {
        Self::EmbeddingUnavailable(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
