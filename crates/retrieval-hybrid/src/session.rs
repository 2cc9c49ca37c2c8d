use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use retrieval_core::chunker::Chunker;
use retrieval_core::config::RetrievalConfig;
use retrieval_core::error::{Error, Result};
use retrieval_core::traits::Embedder;
use retrieval_core::types::{Chunk, ChunkId, Document, RetrievalHit, RetrievalResult, SearchHit};
use retrieval_text::LexicalIndex;
use retrieval_vector::{FlatIndex, Neighbor};

use crate::fusion::{fuse, ScoredCandidate};
use crate::rerank::diversify;

/// Which signals a query consults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    #[default]
    Hybrid,
    /// BM25 only; the embedder is never called.
    LexicalOnly,
}

/// Summary of a completed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub dim: usize,
    pub terms: usize,
    /// Chunks with more words than the embedder's input window; their
    /// vectors only reflect the leading part of the text.
    pub truncated: usize,
}

struct Corpus {
    chunks: Vec<Chunk>,
    vectors: FlatIndex,
    lexical: LexicalIndex,
}

enum SessionState {
    Unbuilt,
    Built(Corpus),
}

/// One corpus, its two indexes and the embedder that built them.
///
/// A session is built exactly once; afterwards it is read-only and `retrieve`
/// may be called from any number of threads through a shared reference.
pub struct RetrievalSession {
    config: RetrievalConfig,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    state: SessionState,
}

impl RetrievalSession {
    pub fn new(config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunking.clone())?;
        Ok(Self { config, chunker, embedder, state: SessionState::Unbuilt })
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub fn embedder_id(&self) -> &str { self.embedder.embedder_id() }

    pub fn is_built(&self) -> bool { matches!(self.state, SessionState::Built(_)) }

    fn corpus(&self) -> Result<&Corpus> {
        match &self.state {
            SessionState::Built(corpus) => Ok(corpus),
            SessionState::Unbuilt => Err(Error::NotReady),
        }
    }

    pub fn chunks(&self) -> Result<&[Chunk]> {
        Ok(&self.corpus()?.chunks)
    }

    pub fn vectors(&self) -> Result<&FlatIndex> {
        Ok(&self.corpus()?.vectors)
    }

    pub fn lexical(&self) -> Result<&LexicalIndex> {
        Ok(&self.corpus()?.lexical)
    }

    pub fn build(&mut self, documents: &[Document]) -> Result<BuildStats> {
        self.build_with_progress(documents, &ProgressBar::hidden())
    }

    /// Chunk `documents`, embed every chunk and build both indexes.
    ///
    /// On any failure the session stays unbuilt.
    pub fn build_with_progress(&mut self, documents: &[Document], progress: &ProgressBar) -> Result<BuildStats> {
        if self.is_built() {
            return Err(Error::AlreadyBuilt);
        }
        let start = Instant::now();
        let chunks = self.chunker.split_all(documents);
        info!(documents = documents.len(), chunks = chunks.len(), "corpus chunked");
        if chunks.is_empty() {
            warn!("corpus produced no chunks; every query will return nothing");
        }

        let truncated = self.count_truncated(&chunks);
        if truncated > 0 {
            warn!(
                truncated,
                max_len = self.embedder.max_len(),
                "chunks exceed the embedder input window; lower chunking.target_size"
            );
        }

        progress.set_length(chunks.len() as u64);
        let vectors = self.embed_chunks(&chunks, progress)?;
        progress.finish_and_clear();

        let stats = self.install(chunks, vectors)?;
        info!(
            documents = documents.len(),
            chunks = stats.chunks,
            dim = stats.dim,
            terms = stats.terms,
            embedder = %self.embedder.embedder_id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "retrieval session built"
        );
        Ok(BuildStats { documents: documents.len(), truncated, ..stats })
    }

    /// Build from chunks and vectors produced earlier by the same embedder,
    /// e.g. a saved snapshot. Chunk ids must equal their positions.
    pub fn build_from_parts(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<BuildStats> {
        if self.is_built() {
            return Err(Error::AlreadyBuilt);
        }
        if let Some((pos, chunk)) = chunks.iter().enumerate().find(|(i, c)| c.chunk_id as usize != *i) {
            warn!(position = pos, chunk_id = chunk.chunk_id, "chunk ids are not dense");
            return Err(Error::UnknownChunk(chunk.chunk_id));
        }
        let stats = self.install(chunks, vectors)?;
        info!(chunks = stats.chunks, dim = stats.dim, "retrieval session restored");
        Ok(stats)
    }

    fn install(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<BuildStats> {
        let dim = self.embedder.dim();
        let index = FlatIndex::build(dim, &chunks, &vectors)?;
        let lexical = LexicalIndex::build(&chunks, &self.config.lexical);
        let sources = {
            let mut s: Vec<&str> = chunks.iter().map(|c| c.source_document.as_str()).collect();
            s.dedup();
            s.len()
        };
        let stats = BuildStats { documents: sources, chunks: chunks.len(), dim, terms: lexical.term_count(), truncated: 0 };
        self.state = SessionState::Built(Corpus { chunks, vectors: index, lexical });
        Ok(stats)
    }

    // Word count is a lower bound on token count.
    fn count_truncated(&self, chunks: &[Chunk]) -> usize {
        let window = self.embedder.max_len();
        chunks.iter().filter(|c| c.text.split_whitespace().count() > window).count()
    }

    fn embed_chunks(&self, chunks: &[Chunk], progress: &ProgressBar) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).map_err(|e| Error::embedding(&e))?;
            if embedded.len() != texts.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "embedder '{}' returned {} vectors for {} texts",
                    self.embedder.embedder_id(),
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            progress.inc(batch.len() as u64);
        }
        Ok(vectors)
    }

    pub fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieve_with(query, RetrievalMode::Hybrid)
    }

    /// Answer one query with at most `rerank_k` diversified chunks.
    ///
    /// An empty result is a normal outcome: nothing cleared the relevance
    /// floor and no chunk shares a term with the query.
    pub fn retrieve_with(&self, query: &str, mode: RetrievalMode) -> Result<RetrievalResult> {
        let corpus = self.corpus()?;
        let requested = self.config.rerank_k;
        let text = query.trim();
        if text.is_empty() {
            debug!("blank query");
            return Ok(RetrievalResult::empty(query, requested));
        }

        let (semantic, alpha) = match mode {
            RetrievalMode::Hybrid => (self.semantic_candidates(corpus, text)?, self.config.alpha),
            RetrievalMode::LexicalOnly => (Vec::new(), 0.0),
        };
        let tokens = corpus.lexical.tokenize(text);
        let lexical = corpus.lexical.top(&tokens, self.config.top_k);
        debug!(semantic = semantic.len(), lexical = lexical.len(), ?mode, "candidates gathered");

        if semantic.is_empty() && lexical.is_empty() {
            info!(query = %text, "no relevant chunks");
            return Ok(RetrievalResult::empty(query, requested));
        }

        let fused = fuse(&corpus.chunks, &semantic, &lexical, alpha)?;
        let selected = diversify(&fused, requested, self.config.effective_max_per_source());
        let result = RetrievalResult {
            query: query.to_string(),
            requested,
            hits: selected.iter().map(to_hit).collect(),
        };
        log_result(&result);
        Ok(result)
    }

    /// Nearest chunks whose similarity clears the relevance floor.
    fn semantic_candidates(&self, corpus: &Corpus, text: &str) -> Result<Vec<SearchHit>> {
        let query_vector = self.embedder.embed(text).map_err(|e| Error::embedding(&e))?;
        let neighbors = match corpus.vectors.search(&query_vector, self.config.top_k) {
            Ok(n) => n,
            Err(Error::EmptyIndex) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let floor = self.config.relevance_floor;
        let hits: Vec<SearchHit> = neighbors
            .into_iter()
            .map(Neighbor::to_hit)
            .filter(|h| h.score > floor)
            .collect();
        debug!(kept = hits.len(), floor, "semantic candidates");
        Ok(hits)
    }

    /// Look up a chunk by id.
    pub fn chunk(&self, chunk_id: ChunkId) -> Result<&Chunk> {
        self.corpus()?
            .chunks
            .get(chunk_id as usize)
            .filter(|c| c.chunk_id == chunk_id)
            .ok_or(Error::UnknownChunk(chunk_id))
    }
}

fn to_hit(candidate: &ScoredCandidate<'_>) -> RetrievalHit {
    let chunk = candidate.chunk;
    RetrievalHit {
        chunk_id: chunk.chunk_id,
        source_document: chunk.source_document.clone(),
        sequence_index: chunk.sequence_index,
        text: chunk.text.clone(),
        char_start: chunk.char_start,
        char_end: chunk.char_end,
        semantic_score: candidate.semantic_score,
        lexical_score: candidate.lexical_score,
        fused_score: candidate.fused_score,
    }
}

fn log_result(result: &RetrievalResult) {
    info!(query = %result.query, hits = result.len(), coverage = ?result.coverage(), "retrieval complete");
    for (rank, hit) in result.hits.iter().enumerate() {
        info!(
            rank = rank + 1,
            source = %hit.source_document,
            chunk_id = hit.chunk_id,
            fused = hit.fused_score,
            semantic = hit.semantic_score,
            lexical = hit.lexical_score,
            "retrieved chunk"
        );
    }
}
