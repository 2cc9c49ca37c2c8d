//! Session snapshots: a built session's chunks and vectors in a LanceDB table,
//! plus the embedder they were produced with.
//!
//! Restoring rebuilds both in-memory indexes from the stored rows without
//! calling the embedder, so a snapshot is only usable with the same embedder.
use anyhow::{anyhow, bail, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, UInt32Array, UInt64Array};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::Connection;
use std::sync::Arc;
use tracing::info;

use retrieval_core::config::RetrievalConfig;
use retrieval_core::traits::Embedder;
use retrieval_core::types::Chunk;
use retrieval_hybrid::RetrievalSession;

use crate::schema::{build_chunk_schema, vector_dim, CHUNKS_TABLE, META_TABLE};
use crate::table::{column, content_hash, get_meta, open_db, set_meta, table_exists};

const KEY_EMBEDDER: &str = "embedder_id";
const KEY_DIM: &str = "dim";
const KEY_CHUNKS: &str = "chunk_count";
const KEY_SAVED_AT: &str = "saved_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub embedder_id: String,
    pub dim: usize,
    pub chunks: usize,
    pub saved_at: String,
}

/// Write `session` to the database at `uri`, replacing any earlier snapshot
/// of the same dimension.
pub async fn save_snapshot(uri: &str, session: &RetrievalSession) -> Result<SnapshotInfo> {
    let chunks = session.chunks()?;
    let index = session.vectors()?;
    let dim = index.dim();
    let conn = open_db(uri).await?;

    let schema = build_chunk_schema(i32::try_from(dim)?);
    let batch = chunks_to_record_batch(chunks, index.iter().map(|(_, v)| v), dim)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    if table_exists(&conn, CHUNKS_TABLE).await? {
        let t = conn.open_table(CHUNKS_TABLE).execute().await?;
        let stored = vector_dim(&*t.schema().await?);
        if stored != Some(dim) {
            bail!(
                "snapshot at {uri} holds {}-dimensional vectors but the session has {dim}; use a fresh location",
                stored.map_or_else(|| "unknown".to_string(), |d| d.to_string())
            );
        }
        t.delete("true").await?;
        t.add(reader).execute().await?;
    } else {
        conn.create_table(CHUNKS_TABLE, reader).execute().await?;
    }

    let info = SnapshotInfo {
        embedder_id: session.embedder_id().to_string(),
        dim,
        chunks: chunks.len(),
        saved_at: Utc::now().to_rfc3339(),
    };
    set_meta(&conn, META_TABLE, KEY_EMBEDDER, &info.embedder_id).await?;
    set_meta(&conn, META_TABLE, KEY_DIM, &info.dim.to_string()).await?;
    set_meta(&conn, META_TABLE, KEY_CHUNKS, &info.chunks.to_string()).await?;
    set_meta(&conn, META_TABLE, KEY_SAVED_AT, &info.saved_at).await?;
    info!(uri, chunks = info.chunks, dim, embedder = %info.embedder_id, "snapshot saved");
    Ok(info)
}

pub async fn read_snapshot_info(uri: &str) -> Result<Option<SnapshotInfo>> {
    let conn = open_db(uri).await?;
    snapshot_info(&conn).await
}

async fn snapshot_info(conn: &Connection) -> Result<Option<SnapshotInfo>> {
    let Some(embedder_id) = get_meta(conn, META_TABLE, KEY_EMBEDDER).await? else {
        return Ok(None);
    };
    let number = |v: Option<String>, key: &str| -> Result<usize> {
        v.ok_or_else(|| anyhow!("snapshot metadata has no '{key}'"))?
            .parse::<usize>()
            .map_err(|e| anyhow!("snapshot metadata '{key}' is not a number: {e}"))
    };
    let dim = number(get_meta(conn, META_TABLE, KEY_DIM).await?, KEY_DIM)?;
    let chunks = number(get_meta(conn, META_TABLE, KEY_CHUNKS).await?, KEY_CHUNKS)?;
    let saved_at = get_meta(conn, META_TABLE, KEY_SAVED_AT).await?.unwrap_or_default();
    Ok(Some(SnapshotInfo { embedder_id, dim, chunks, saved_at }))
}

/// Restore a built session from the snapshot at `uri`.
///
/// Fails when there is no snapshot, or when `embedder` differs in id or
/// dimension from the one the snapshot was built with.
///
/// The session shares `embedder`; the caller keeps its own reference, so an
/// embedder that owns a runtime is never dropped inside this future.
pub async fn load_snapshot(uri: &str, config: RetrievalConfig, embedder: &Arc<dyn Embedder>) -> Result<RetrievalSession> {
    let conn = open_db(uri).await?;
    let info = snapshot_info(&conn).await?.ok_or_else(|| anyhow!("no snapshot found at {uri}"))?;
    if info.embedder_id != embedder.embedder_id() || info.dim != embedder.dim() {
        bail!(
            "snapshot at {uri} was built with '{}' (d{}), current embedder is '{}' (d{})",
            info.embedder_id,
            info.dim,
            embedder.embedder_id(),
            embedder.dim()
        );
    }

    let (chunks, vectors) = read_chunks(&conn).await?;
    if chunks.len() != info.chunks {
        bail!("snapshot at {uri} lists {} chunks but holds {}", info.chunks, chunks.len());
    }
    let mut session = RetrievalSession::new(config, Arc::clone(embedder))?;
    session.build_from_parts(chunks, vectors)?;
    info!(uri, chunks = info.chunks, embedder = %info.embedder_id, "snapshot loaded");
    Ok(session)
}

async fn read_chunks(conn: &Connection) -> Result<(Vec<Chunk>, Vec<Vec<f32>>)> {
    if !table_exists(conn, CHUNKS_TABLE).await? {
        return Ok((Vec::new(), Vec::new()));
    }
    let t = conn.open_table(CHUNKS_TABLE).execute().await?;
    let mut stream = t.query().execute().await?;
    let mut rows: Vec<(Chunk, Vec<f32>)> = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        let ids = column::<UInt32Array>(&batch, "chunk_id")?;
        let sources = column::<StringArray>(&batch, "source_document")?;
        let seqs = column::<UInt64Array>(&batch, "sequence_index")?;
        let texts = column::<StringArray>(&batch, "text")?;
        let starts = column::<UInt64Array>(&batch, "char_start")?;
        let ends = column::<UInt64Array>(&batch, "char_end")?;
        let overlaps = column::<UInt64Array>(&batch, "overlap_len")?;
        let vecs = column::<FixedSizeListArray>(&batch, "vector")?;
        for i in 0..batch.num_rows() {
            let chunk = Chunk {
                chunk_id: ids.value(i),
                source_document: sources.value(i).to_string(),
                sequence_index: usize::try_from(seqs.value(i))?,
                text: texts.value(i).to_string(),
                char_start: usize::try_from(starts.value(i))?,
                char_end: usize::try_from(ends.value(i))?,
                overlap_len: usize::try_from(overlaps.value(i))?,
            };
            let vector = vecs.value(i).as_primitive::<Float32Type>().values().to_vec();
            rows.push((chunk, vector));
        }
    }
    // Row order in the table is not guaranteed.
    rows.sort_by_key(|(c, _)| c.chunk_id);
    Ok(rows.into_iter().unzip())
}

fn chunks_to_record_batch<'a>(
    chunks: &[Chunk],
    vectors: impl Iterator<Item = &'a [f32]>,
    dim: usize,
) -> Result<RecordBatch> {
    let mut ids = Vec::with_capacity(chunks.len());
    let mut sources = Vec::with_capacity(chunks.len());
    let mut seqs = Vec::with_capacity(chunks.len());
    let mut texts = Vec::with_capacity(chunks.len());
    let mut starts = Vec::with_capacity(chunks.len());
    let mut ends = Vec::with_capacity(chunks.len());
    let mut overlaps = Vec::with_capacity(chunks.len());
    let mut hashes = Vec::with_capacity(chunks.len());
    for c in chunks {
        ids.push(c.chunk_id);
        sources.push(c.source_document.clone());
        seqs.push(c.sequence_index as u64);
        texts.push(c.text.clone());
        starts.push(c.char_start as u64);
        ends.push(c.char_end as u64);
        overlaps.push(c.overlap_len as u64);
        hashes.push(content_hash(&c.text));
    }
    let vectors: Vec<Option<Vec<Option<f32>>>> = vectors.map(|v| Some(v.iter().map(|&x| Some(x)).collect())).collect();
    if vectors.len() != chunks.len() {
        bail!("{} chunks but {} vectors", chunks.len(), vectors.len());
    }
    let dim = i32::try_from(dim)?;
    let batch = RecordBatch::try_new(
        build_chunk_schema(dim),
        vec![
            Arc::new(UInt32Array::from(ids)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt64Array::from(seqs)),
            Arc::new(StringArray::from(texts)),
            Arc::new(UInt64Array::from(starts)),
            Arc::new(UInt64Array::from(ends)),
            Arc::new(UInt64Array::from(overlaps)),
            Arc::new(StringArray::from(hashes)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
        ],
    )?;
    Ok(batch)
}
