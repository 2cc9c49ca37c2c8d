//! Lance-backed embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted before calling the wrapped embedder and written
//! through on misses, so rebuilding an unchanged corpus embeds nothing.
use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

use retrieval_core::traits::Embedder;

use crate::schema::{build_cache_schema, cache_table_name};
use crate::table::{column, content_hash, ensure_table, open_db, quote};

const LOOKUP_CHUNK: usize = 256;

/// Fetch cached vectors for `hashes`. Only rows whose hash is requested are
/// read, so a lookup costs the batch size rather than the cache size.
pub async fn get_many(
    conn: &Connection,
    table: &str,
    embedder_id: &str,
    dim: usize,
    hashes: &HashSet<String>,
) -> Result<HashMap<String, Vec<f32>>> {
    let mut out = HashMap::new();
    if hashes.is_empty() {
        return Ok(out);
    }
    let t = conn.open_table(table).execute().await?;
    let wanted: Vec<&String> = hashes.iter().collect();
    for group in wanted.chunks(LOOKUP_CHUNK) {
        let list = group.iter().map(|h| quote(h)).collect::<Vec<_>>().join(", ");
        let filter = format!("embedder_id = {} AND content_hash IN ({list})", quote(embedder_id));
        let mut stream = t.query().only_if(filter).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            let hash_col = column::<StringArray>(&batch, "content_hash")?;
            let vec_col = column::<FixedSizeListArray>(&batch, "vector")?;
            for i in 0..batch.num_rows() {
                let vals = vec_col.value(i).as_primitive::<Float32Type>().values().to_vec();
                if vals.len() == dim {
                    out.insert(hash_col.value(i).to_string(), vals);
                }
            }
        }
    }
    Ok(out)
}

pub async fn put_many(conn: &Connection, table: &str, embedder_id: &str, dim: usize, entries: &[(String, Vec<f32>)]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let dim = i32::try_from(dim)?;
    let now = Utc::now().timestamp_millis();
    let hashes: Vec<String> = entries.iter().map(|(h, _)| h.clone()).collect();
    let eids = vec![embedder_id.to_string(); entries.len()];
    let created = vec![now; entries.len()];
    let vectors: Vec<Option<Vec<Option<f32>>>> = entries.iter().map(|(_, v)| Some(v.iter().map(|&x| Some(x)).collect())).collect();
    let batch = RecordBatch::try_new(
        build_cache_schema(dim),
        vec![
            Arc::new(StringArray::from(hashes)),
            Arc::new(StringArray::from(eids)),
            Arc::new(TimestampMillisecondArray::from(created)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), build_cache_schema(dim)));
    conn.open_table(table).execute().await?.add(reader).execute().await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Wraps an embedder with a persistent cache. Reports the inner embedder's
/// id, so vectors from a cached and an uncached run are interchangeable.
///
/// Owns a small tokio runtime and blocks on it; do not call from inside an
/// async context.
pub struct CachedEmbedder<E: Embedder> {
    inner: E,
    conn: Connection,
    table: String,
    runtime: Runtime,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn open(inner: E, uri: &str) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let table = cache_table_name(inner.dim());
        let dim = i32::try_from(inner.dim())?;
        let conn = runtime.block_on(async {
            let conn = open_db(uri).await?;
            ensure_table(&conn, &table, build_cache_schema(dim)).await?;
            Ok::<_, anyhow::Error>(conn)
        })?;
        Ok(Self { inner, conn, table, runtime, hits: AtomicUsize::new(0), misses: AtomicUsize::new(0) })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let id = self.inner.embedder_id();
        let dim = self.inner.dim();
        let keys: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();
        let wanted: HashSet<String> = keys.iter().cloned().collect();
        let mut found = self.runtime.block_on(get_many(&self.conn, &self.table, id, dim, &wanted))?;

        // Distinct misses only; the same text twice in a batch is embedded once.
        let mut miss_keys: Vec<String> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();
        for (key, text) in keys.iter().zip(texts) {
            if !found.contains_key(key) && !miss_keys.contains(key) {
                miss_keys.push(key.clone());
                miss_texts.push(text.clone());
            }
        }
        let hit_count = texts.len() - keys.iter().filter(|k| miss_keys.contains(*k)).count();
        self.hits.fetch_add(hit_count, Ordering::Relaxed);
        self.misses.fetch_add(miss_keys.len(), Ordering::Relaxed);
        debug!(hits = hit_count, misses = miss_keys.len(), "embedding cache lookup");

        if !miss_texts.is_empty() {
            let fresh = self.inner.embed_batch(&miss_texts)?;
            if fresh.len() != miss_texts.len() {
                return Err(anyhow!("embedder '{id}' returned {} vectors for {} texts", fresh.len(), miss_texts.len()));
            }
            if let Some(bad) = fresh.iter().find(|v| v.len() != dim) {
                return Err(anyhow!("embedder '{id}' returned a {}-dimensional vector, expected {dim}", bad.len()));
            }
            let entries: Vec<(String, Vec<f32>)> = miss_keys.into_iter().zip(fresh).collect();
            self.runtime.block_on(put_many(&self.conn, &self.table, id, dim, &entries))?;
            found.extend(entries);
        }

        keys.iter()
            .map(|k| found.get(k).cloned().ok_or_else(|| anyhow!("embedding cache lost entry {k}")))
            .collect()
    }
}
