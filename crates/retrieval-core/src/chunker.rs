//! Boundary-preserving document splitter.
//!
//! Text is split recursively at the strongest separator present in an
//! oversized span, falling back to weaker separators and finally to a hard cut
//! every `target_size` characters. The resulting pieces are merged greedily
//! into chunk bodies of at most `target_size` characters, and each chunk after
//! the first is prefixed with up to `overlap` trailing characters of its
//! predecessor, so a chunk's full text may reach `target_size + overlap`
//! characters. Chunks are exact spans of the source text, so the fresh parts
//! of a document's chunks concatenate back to the original.

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{Chunk, ChunkId, Document};

/// Byte offsets of one chunk: `start..end` is the chunk text and
/// `body_start..end` the part not shared with the previous chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split one document; chunk ids are assigned from `first_id` upward.
    pub fn split(&self, document: &Document, first_id: ChunkId) -> Vec<Chunk> {
        let text = document.text.as_str();
        let spans = self.spans(text);
        let mut starts = CharCursor::new(text);
        let mut ends = CharCursor::new(text);
        let chunks: Vec<Chunk> = spans
            .iter()
            .enumerate()
            .map(|(i, span)| Chunk {
                chunk_id: first_id + i as ChunkId,
                source_document: document.source.clone(),
                sequence_index: i,
                text: text[span.start..span.end].to_string(),
                char_start: starts.advance_to(span.start),
                char_end: ends.advance_to(span.end),
                overlap_len: text[span.start..span.body_start].chars().count(),
            })
            .collect();
        debug!(source = %document.source, chunks = chunks.len(), "split document");
        chunks
    }

    /// Split a whole corpus, numbering chunks consecutively across documents.
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut out = Vec::new();
        for doc in documents {
            let next = out.len() as ChunkId;
            out.extend(self.split(doc, next));
        }
        out
    }

    pub fn spans(&self, text: &str) -> Vec<ChunkSpan> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        self.split_range(text, 0, text.len(), 0, &mut pieces);
        let bodies = self.merge(text, &pieces);

        let mut spans = Vec::with_capacity(bodies.len());
        let mut prev_start: Option<usize> = None;
        for (body_start, end) in bodies {
            let start = match prev_start {
                None => body_start,
                Some(ps) => back_chars(text, body_start, self.config.overlap).max(ps),
            };
            spans.push(ChunkSpan { start, body_start, end });
            prev_start = Some(start);
        }
        spans
    }

    fn split_range(&self, text: &str, start: usize, end: usize, level: usize, out: &mut Vec<(usize, usize)>) {
        let slice = &text[start..end];
        if slice.chars().count() <= self.config.target_size {
            out.push((start, end));
            return;
        }
        for (offset, sep) in self.config.separators[level.min(self.config.separators.len())..].iter().enumerate() {
            if !slice.contains(sep.as_str()) {
                continue;
            }
            let next_level = level + offset + 1;
            let mut piece_start = start;
            // The separator stays attached to the piece it terminates.
            for (idx, _) in slice.match_indices(sep.as_str()) {
                let piece_end = start + idx + sep.len();
                self.split_range(text, piece_start, piece_end, next_level, out);
                piece_start = piece_end;
            }
            if piece_start < end {
                self.split_range(text, piece_start, end, next_level, out);
            }
            return;
        }
        self.hard_cut(text, start, end, out);
    }

    fn hard_cut(&self, text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
        let mut piece_start = start;
        let mut count = 0usize;
        for (idx, _) in text[start..end].char_indices() {
            if count == self.config.target_size {
                out.push((piece_start, start + idx));
                piece_start = start + idx;
                count = 0;
            }
            count += 1;
        }
        if piece_start < end {
            out.push((piece_start, end));
        }
    }

    fn merge(&self, text: &str, pieces: &[(usize, usize)]) -> Vec<(usize, usize)> {
        let mut bodies = Vec::new();
        let mut current: Option<(usize, usize, usize)> = None;
        for &(s, e) in pieces {
            let len = text[s..e].chars().count();
            current = match current {
                Some((cs, _, cl)) if cl + len <= self.config.target_size => Some((cs, e, cl + len)),
                Some((cs, ce, _)) => {
                    bodies.push((cs, ce));
                    Some((s, e, len))
                }
                None => Some((s, e, len)),
            };
        }
        if let Some((cs, ce, _)) = current {
            bodies.push((cs, ce));
        }
        bodies
    }
}

/// Byte index `n` characters before `pos`, clamped to 0.
fn back_chars(text: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    text[..pos].char_indices().rev().nth(n - 1).map(|(i, _)| i).unwrap_or(0)
}

/// Monotonic byte-to-char offset conversion.
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, byte: 0, chars: 0 }
    }

    fn advance_to(&mut self, byte: usize) -> usize {
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}
