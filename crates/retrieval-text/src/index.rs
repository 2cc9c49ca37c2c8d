use std::collections::{BTreeMap, BTreeSet, HashMap};

use tantivy::tokenizer::TextAnalyzer;
use tracing::info;

use retrieval_core::config::LexicalConfig;
use retrieval_core::types::{Chunk, ChunkId, SearchHit};

use crate::analyzer::{build_analyzer, tokenize};

/// In-memory Okapi BM25 index over chunk token sets.
///
/// Term statistics (document frequency, per-chunk term frequency, chunk
/// length, average length) are derived once in `build` and never updated; a
/// corpus change means building a new index.
pub struct LexicalIndex {
	analyzer: TextAnalyzer,
	k1: f32,
	b: f32,
	/// term -> (chunk, term frequency), ascending by chunk id
	postings: HashMap<String, Vec<(ChunkId, u32)>>,
	lengths: HashMap<ChunkId, u32>,
	avg_len: f32,
}

impl LexicalIndex {
	pub fn build(chunks: &[Chunk], config: &LexicalConfig) -> Self {
		let analyzer = build_analyzer(config.stop_words);
		let mut postings: HashMap<String, Vec<(ChunkId, u32)>> = HashMap::new();
		let mut lengths = HashMap::with_capacity(chunks.len());
		let mut total_len = 0u64;

		let mut ordered: Vec<&Chunk> = chunks.iter().collect();
		ordered.sort_by_key(|c| c.chunk_id);
		for chunk in ordered {
			let tokens = tokenize(&analyzer, &chunk.text);
			total_len += tokens.len() as u64;
			lengths.insert(chunk.chunk_id, tokens.len() as u32);
			let mut tf: BTreeMap<String, u32> = BTreeMap::new();
			for t in tokens {
				*tf.entry(t).or_insert(0) += 1;
			}
			for (term, freq) in tf {
				postings.entry(term).or_default().push((chunk.chunk_id, freq));
			}
		}
		let avg_len = if chunks.is_empty() { 0.0 } else { total_len as f32 / chunks.len() as f32 };
		info!(chunks = chunks.len(), terms = postings.len(), avg_len, "lexical index built");
		Self { analyzer, k1: config.k1, b: config.b, postings, lengths, avg_len }
	}

	pub fn len(&self) -> usize { self.lengths.len() }

	pub fn is_empty(&self) -> bool { self.lengths.is_empty() }

	pub fn term_count(&self) -> usize { self.postings.len() }

	pub fn avg_len(&self) -> f32 { self.avg_len }

	pub fn doc_freq(&self, term: &str) -> usize {
		self.postings.get(term).map_or(0, Vec::len)
	}

	/// Tokenize text exactly as chunks were tokenized at build time.
	pub fn tokenize(&self, text: &str) -> Vec<String> {
		tokenize(&self.analyzer, text)
	}

	/// Inverse document frequency, always positive so rarer terms weigh more.
	pub fn idf(&self, term: &str) -> f32 {
		let n = self.len() as f32;
		let df = self.doc_freq(term) as f32;
		(1.0 + (n - df + 0.5) / (df + 0.5)).ln()
	}

	/// BM25 score of every chunk sharing at least one term with the query.
	///
	/// Repeated query terms count once and terms are visited in sorted order,
	/// so the result does not depend on query term order.
	pub fn score(&self, query_tokens: &[String]) -> BTreeMap<ChunkId, f32> {
		let mut scores = BTreeMap::new();
		let terms: BTreeSet<&str> = query_tokens.iter().map(String::as_str).collect();
		let avg_len = if self.avg_len > 0.0 { self.avg_len } else { 1.0 };
		for term in terms {
			let Some(list) = self.postings.get(term) else { continue };
			let idf = self.idf(term);
			for &(chunk_id, tf) in list {
				let tf = tf as f32;
				let len = self.lengths.get(&chunk_id).copied().unwrap_or(0) as f32;
				let norm = self.k1 * (1.0 - self.b + self.b * len / avg_len);
				*scores.entry(chunk_id).or_insert(0.0) += idf * tf * (self.k1 + 1.0) / (tf + norm);
			}
		}
		scores
	}

	/// The `k` best lexical candidates, ties broken by ascending chunk id.
	pub fn top(&self, query_tokens: &[String], k: usize) -> Vec<SearchHit> {
		let mut hits: Vec<SearchHit> = self
			.score(query_tokens)
			.into_iter()
			.filter(|(_, s)| *s > 0.0)
			.map(|(id, s)| SearchHit::lexical(id, s))
			.collect();
		hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.chunk_id.cmp(&b.chunk_id)));
		hits.truncate(k);
		hits
	}

	pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
		self.top(&self.tokenize(query), k)
	}
}
