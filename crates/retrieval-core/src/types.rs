//! Domain types shared by the chunker, both indexes and the retrieval session.

use serde::{Deserialize, Serialize};

pub type ChunkId = u32;

/// How the raw text of a document was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    PdfText,
}

/// A loaded source document. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub text: String,
    pub format: DocumentFormat,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>, format: DocumentFormat) -> Self {
        Self { source: source.into(), text: text.into(), format }
    }

    pub fn plain(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(source, text, DocumentFormat::PlainText)
    }
}

/// A contiguous span of one document, the unit of retrieval.
///
/// - `chunk_id`: unique within one build, also the chunk's position in the corpus
/// - `source_document`: `Document::source` of the owning document
/// - `sequence_index`: position within the owning document
/// - `char_start`/`char_end`: character offsets into the document text, end exclusive
/// - `overlap_len`: leading characters repeated from the previous chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub source_document: String,
    pub sequence_index: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub overlap_len: usize,
}

impl Chunk {
    /// Text of this chunk without the prefix shared with its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap_len) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// Which ranking signal produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Semantic,
    Lexical,
}

/// A per-signal candidate handed to fusion.
///
/// `score` is signal-specific but higher is always better: bounded similarity
/// for `Semantic`, the additive BM25 score for `Lexical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

impl SearchHit {
    pub fn semantic(chunk_id: ChunkId, score: f32) -> Self {
        Self { chunk_id, score, source: SourceKind::Semantic }
    }

    pub fn lexical(chunk_id: ChunkId, score: f32) -> Self {
        Self { chunk_id, score, source: SourceKind::Lexical }
    }
}

/// One surviving chunk in a retrieval result, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalHit {
    pub chunk_id: ChunkId,
    pub source_document: String,
    pub sequence_index: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub fused_score: f32,
}

/// How much of the requested context a query produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    Full,
    Partial,
    Empty,
}

/// The engine's externally visible output: hits in descending fused order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub query: String,
    pub requested: usize,
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn empty(query: impl Into<String>, requested: usize) -> Self {
        Self { query: query.into(), requested, hits: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// `Partial` and `Empty` both mean "insufficient relevant content".
    pub fn coverage(&self) -> Coverage {
        if self.hits.is_empty() {
            Coverage::Empty
        } else if self.hits.len() < self.requested {
            Coverage::Partial
        } else {
            Coverage::Full
        }
    }

    pub fn sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for hit in &self.hits {
            if !out.contains(&hit.source_document.as_str()) {
                out.push(hit.source_document.as_str());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: ChunkId, source: &str) -> RetrievalHit {
        RetrievalHit {
            chunk_id: id,
            source_document: source.to_string(),
            sequence_index: 0,
            text: String::new(),
            char_start: 0,
            char_end: 1,
            semantic_score: 0.0,
            lexical_score: 0.0,
            fused_score: 0.0,
        }
    }

    #[test]
    fn coverage_tracks_requested_count() {
        let mut r = RetrievalResult::empty("q", 3);
        assert_eq!(r.coverage(), Coverage::Empty);
        r.hits.push(hit(0, "a"));
        assert_eq!(r.coverage(), Coverage::Partial);
        r.hits.push(hit(1, "b"));
        r.hits.push(hit(2, "a"));
        assert_eq!(r.coverage(), Coverage::Full);
        assert_eq!(r.sources(), vec!["a", "b"]);
    }

    #[test]
    fn fresh_text_skips_overlap_chars() {
        let c = Chunk {
            chunk_id: 0,
            source_document: "d".into(),
            sequence_index: 1,
            text: "héllo world".into(),
            char_start: 3,
            char_end: 14,
            overlap_len: 2,
        };
        assert_eq!(c.fresh_text(), "llo world");
    }
}
