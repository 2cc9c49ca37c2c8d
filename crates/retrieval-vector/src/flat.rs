use serde::{Deserialize, Serialize};
use tracing::info;

use retrieval_core::error::{Error, Result};
use retrieval_core::types::{Chunk, ChunkId, SearchHit};

/// A nearest-neighbour answer: smaller distance is closer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub chunk_id: ChunkId,
    pub distance: f32,
}

impl Neighbor {
    pub fn similarity(&self) -> f32 {
        similarity(self.distance)
    }

    pub fn to_hit(self) -> SearchHit {
        SearchHit::semantic(self.chunk_id, self.similarity())
    }
}

/// Bounded, higher-is-better view of a distance: `1 / (1 + d)`.
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Flat index holding only chunk ids and their vectors (row-major).
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    ids: Vec<ChunkId>,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build over `chunks[i] <-> vectors[i]`; every vector must have `dim` entries.
    pub fn build(dim: usize, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(Error::CorpusMismatch { chunks: chunks.len(), vectors: vectors.len() });
        }
        let mut data = Vec::with_capacity(dim * vectors.len());
        for v in vectors {
            if v.len() != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: v.len() });
            }
            data.extend_from_slice(v);
        }
        let ids = chunks.iter().map(|c| c.chunk_id).collect();
        info!(vectors = vectors.len(), dim, "vector index built");
        Ok(Self { dim, ids, data })
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn len(&self) -> usize { self.ids.len() }

    pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    /// Stored `(chunk_id, vector)` pairs in build order.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkId, &[f32])> + '_ {
        self.ids.iter().copied().zip(self.data.chunks_exact(self.dim.max(1)))
    }

    pub fn vector(&self, chunk_id: ChunkId) -> Option<&[f32]> {
        let row = self.ids.iter().position(|&id| id == chunk_id)?;
        Some(&self.data[row * self.dim..(row + 1) * self.dim])
    }

    /// Up to `k` nearest chunks by squared L2 distance, ties by ascending chunk id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        let mut all: Vec<Neighbor> = self
            .ids
            .iter()
            .zip(self.data.chunks_exact(self.dim.max(1)))
            .map(|(&chunk_id, row)| Neighbor { chunk_id, distance: squared_l2(query, row) })
            .collect();
        all.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.chunk_id.cmp(&b.chunk_id)));
        all.truncate(k);
        Ok(all)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                chunk_id: i as ChunkId,
                source_document: "d".into(),
                sequence_index: i,
                text: format!("chunk {i}"),
                char_start: 0,
                char_end: 1,
                overlap_len: 0,
            })
            .collect()
    }

    #[test]
    fn nearest_first_with_id_tie_break() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.5, 0.5]];
        let idx = FlatIndex::build(2, &chunks(4), &vectors).unwrap();
        let hits = idx.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<ChunkId> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![0, 2, 3]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[0].similarity(), 1.0);
        assert!((hits[2].distance - 0.5).abs() < 1e-6);
    }

    #[test]
    fn k_larger_than_corpus_returns_everything() {
        let idx = FlatIndex::build(1, &chunks(2), &[vec![0.0], vec![3.0]]).unwrap();
        assert_eq!(idx.search(&[1.0], 10).unwrap().len(), 2);
        assert!(idx.search(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_and_wrong_dimension_fail() {
        let empty = FlatIndex::build(3, &[], &[]).unwrap();
        assert!(matches!(empty.search(&[0.0; 3], 1), Err(Error::EmptyIndex)));
        let idx = FlatIndex::build(2, &chunks(1), &[vec![0.0, 0.0]]).unwrap();
        assert!(matches!(
            idx.search(&[0.0; 3], 1),
            Err(Error::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn build_rejects_inconsistent_inputs() {
        assert!(matches!(
            FlatIndex::build(2, &chunks(2), &[vec![0.0, 0.0]]),
            Err(Error::CorpusMismatch { chunks: 2, vectors: 1 })
        ));
        assert!(matches!(
            FlatIndex::build(2, &chunks(1), &[vec![0.0]]),
            Err(Error::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn similarity_is_bounded_and_decreasing() {
        assert_eq!(similarity(0.0), 1.0);
        assert!(similarity(1.0) > similarity(2.0));
        assert!(similarity(1e9) > 0.0);
    }
}
