//! Hybrid retrieval: score fusion, source-diversified reranking and the
//! retrieval session that ties chunking, both indexes and the embedder
//! together.

pub mod eval;
pub mod fusion;
pub mod handle;
pub mod rerank;
pub mod session;

pub use eval::{evaluate, evaluate_with, load_questions, EvalQuestion, EvalReport, ExpectedOutcome};
pub use fusion::{fuse, normalize, ScoredCandidate};
pub use handle::SessionHandle;
pub use rerank::diversify;
pub use session::{BuildStats, RetrievalMode, RetrievalSession};
