//! Weighted fusion of min-max normalized semantic and lexical scores.

use std::collections::BTreeMap;

use retrieval_core::error::{Error, Result};
use retrieval_core::types::{Chunk, ChunkId, SearchHit};

/// A chunk with its normalized per-signal scores and their weighted sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate<'a> {
    pub chunk: &'a Chunk,
    pub semantic_score: f32,
    pub lexical_score: f32,
    pub fused_score: f32,
}

impl ScoredCandidate<'_> {
    pub fn chunk_id(&self) -> ChunkId {
        self.chunk.chunk_id
    }
}

/// Fuse two candidate lists over the corpus `chunks` (indexed by chunk id).
///
/// Each signal is min-max normalized to `[0, 1]` over the chunks it scored;
/// a chunk missing from one signal gets 0 there. The result is sorted by
/// descending `alpha * semantic + (1 - alpha) * lexical`, ties by ascending
/// chunk id.
pub fn fuse<'a>(
    chunks: &'a [Chunk],
    semantic: &[SearchHit],
    lexical: &[SearchHit],
    alpha: f32,
) -> Result<Vec<ScoredCandidate<'a>>> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::config(format!("alpha must lie in [0, 1], got {alpha}")));
    }
    let sem = normalize(semantic);
    let lex = normalize(lexical);

    let mut union: BTreeMap<ChunkId, (f32, f32)> = BTreeMap::new();
    for (id, s) in sem {
        union.entry(id).or_insert((0.0, 0.0)).0 = s;
    }
    for (id, l) in lex {
        union.entry(id).or_insert((0.0, 0.0)).1 = l;
    }

    let mut fused = Vec::with_capacity(union.len());
    for (id, (s, l)) in union {
        let chunk = chunks.get(id as usize).filter(|c| c.chunk_id == id).ok_or(Error::UnknownChunk(id))?;
        fused.push(ScoredCandidate {
            chunk,
            semantic_score: s,
            lexical_score: l,
            fused_score: alpha * s + (1.0 - alpha) * l,
        });
    }
    fused.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score).then(a.chunk_id().cmp(&b.chunk_id())));
    Ok(fused)
}

/// Min-max normalize scores to `[0, 1]`. When every score is equal there is no
/// spread to normalize, so all of them count as the best on that signal.
/// Duplicate ids keep their highest score.
pub fn normalize(hits: &[SearchHit]) -> BTreeMap<ChunkId, f32> {
    let mut best: BTreeMap<ChunkId, f32> = BTreeMap::new();
    for h in hits {
        let e = best.entry(h.chunk_id).or_insert(h.score);
        if h.score > *e {
            *e = h.score;
        }
    }
    let (min, max) = best.values().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    for v in best.values_mut() {
        *v = if range > f32::EPSILON { (*v - min) / range } else { 1.0 };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                chunk_id: i as ChunkId,
                source_document: format!("doc{}", i % 2),
                sequence_index: i,
                text: format!("chunk {i}"),
                char_start: 0,
                char_end: 1,
                overlap_len: 0,
            })
            .collect()
    }

    fn ids(c: &[ScoredCandidate<'_>]) -> Vec<ChunkId> {
        c.iter().map(ScoredCandidate::chunk_id).collect()
    }

    #[test]
    fn union_with_absent_side_scoring_zero() {
        let chunks = corpus(4);
        let sem = [SearchHit::semantic(0, 0.9), SearchHit::semantic(1, 0.5)];
        let lex = [SearchHit::lexical(1, 4.0), SearchHit::lexical(2, 2.0)];
        let fused = fuse(&chunks, &sem, &lex, 0.7).unwrap();
        assert_eq!(fused.len(), 3);
        let by_id = |id| fused.iter().find(|c| c.chunk_id() == id).copied().unwrap();
        assert_eq!(by_id(0).semantic_score, 1.0);
        assert_eq!(by_id(0).lexical_score, 0.0);
        assert_eq!(by_id(1).semantic_score, 0.0);
        assert_eq!(by_id(1).lexical_score, 1.0);
        assert_eq!(by_id(2).lexical_score, 0.0);
        assert!((by_id(0).fused_score - 0.7).abs() < 1e-6);
        assert!((by_id(1).fused_score - 0.3).abs() < 1e-6);
        assert_eq!(ids(&fused), vec![0, 1, 2]);
    }

    #[test]
    fn normalization_makes_scales_comparable() {
        let chunks = corpus(2);
        // Raw lexical scores dwarf similarities; after normalization alpha decides.
        let sem = [SearchHit::semantic(0, 0.9), SearchHit::semantic(1, 0.3)];
        let lex = [SearchHit::lexical(0, 1.0), SearchHit::lexical(1, 50.0)];
        assert_eq!(ids(&fuse(&chunks, &sem, &lex, 0.6).unwrap()), vec![0, 1]);
        assert_eq!(ids(&fuse(&chunks, &sem, &lex, 0.4).unwrap()), vec![1, 0]);
    }

    #[test]
    fn ties_break_by_ascending_chunk_id() {
        let chunks = corpus(4);
        let sem = [SearchHit::semantic(3, 0.5), SearchHit::semantic(1, 0.5)];
        let lex = [SearchHit::lexical(2, 1.0), SearchHit::lexical(0, 1.0)];
        let fused = fuse(&chunks, &sem, &lex, 0.5).unwrap();
        assert_eq!(ids(&fused), vec![0, 1, 2, 3]);
        assert!(fused.iter().all(|c| c.fused_score == 0.5));
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let chunks = corpus(6);
        let sem: Vec<SearchHit> = (0..6).map(|i| SearchHit::semantic(i, 0.1 * i as f32)).collect();
        let lex: Vec<SearchHit> = (0..6).rev().map(|i| SearchHit::lexical(i, (i * i) as f32 + 0.5)).collect();
        let a = fuse(&chunks, &sem, &lex, 0.37).unwrap();
        let b = fuse(&chunks, &sem, &lex, 0.37).unwrap();
        assert_eq!(ids(&a), ids(&b));
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.fused_score.to_bits(), y.fused_score.to_bits());
        }
    }

    #[test]
    fn higher_alpha_never_demotes_the_semantically_stronger_chunk() {
        let chunks = corpus(3);
        // Chunks 0 and 1 tie on lexical score; 0 is semantically stronger.
        let sem = [SearchHit::semantic(0, 0.8), SearchHit::semantic(1, 0.4), SearchHit::semantic(2, 0.6)];
        let lex = [SearchHit::lexical(0, 2.0), SearchHit::lexical(1, 2.0), SearchHit::lexical(2, 5.0)];
        let mut last_gap = f32::NEG_INFINITY;
        for step in 0..=10 {
            let alpha = step as f32 / 10.0;
            let fused = fuse(&chunks, &sem, &lex, alpha).unwrap();
            let pos = |id| fused.iter().position(|c| c.chunk_id() == id).unwrap();
            assert!(pos(0) < pos(1), "alpha={alpha}");
            let score = |id| fused[pos(id)].fused_score;
            let gap = score(0) - score(1);
            assert!(gap >= last_gap);
            last_gap = gap;
        }
    }

    #[test]
    fn single_candidate_normalizes_to_one() {
        let n = normalize(&[SearchHit::lexical(4, 0.02)]);
        assert_eq!(n[&4], 1.0);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn rejects_bad_alpha_and_unknown_chunks() {
        let chunks = corpus(1);
        assert!(matches!(fuse(&chunks, &[], &[], 1.5), Err(Error::Configuration(_))));
        let lex = [SearchHit::lexical(9, 1.0)];
        assert!(matches!(fuse(&chunks, &[], &lex, 0.5), Err(Error::UnknownChunk(9))));
    }
}
