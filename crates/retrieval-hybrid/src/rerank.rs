//! Source-diversified top-K selection over a fused ranking.

use std::collections::HashMap;

use crate::fusion::ScoredCandidate;

/// Greedily keep candidates in ranking order, skipping any whose source
/// document already supplied `max_per_source` accepted candidates, until
/// `final_k` are accepted or the ranking runs out.
///
/// Fewer than `final_k` results (even none) is a valid outcome.
pub fn diversify<'a>(
    ranking: &[ScoredCandidate<'a>],
    final_k: usize,
    max_per_source: usize,
) -> Vec<ScoredCandidate<'a>> {
    let mut per_source: HashMap<&str, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(final_k.min(ranking.len()));
    for candidate in ranking {
        if selected.len() >= final_k {
            break;
        }
        let count = per_source.entry(candidate.chunk.source_document.as_str()).or_insert(0);
        if *count >= max_per_source {
            continue;
        }
        *count += 1;
        selected.push(*candidate);
    }
    selected
}
