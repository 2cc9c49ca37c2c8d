use std::collections::HashSet;
use std::sync::Arc;

use tokio::runtime::Runtime;

use retrieval_core::{ChunkingConfig, Document, Embedder, RetrievalConfig};
use retrieval_embed::HashEmbedder;
use retrieval_hybrid::RetrievalSession;
use retrieval_store::cache::{get_many, put_many};
use retrieval_store::schema::{build_cache_schema, cache_table_name};
use retrieval_store::table::{content_hash, ensure_table, open_db};
use retrieval_store::{load_snapshot, read_snapshot_info, save_snapshot, CachedEmbedder};

fn corpus() -> Vec<Document> {
    vec![
        Document::plain("refund_policy.txt", "Customers may request a refund within 30 days of receiving a product."),
        Document::plain(
            "shipping_policy.txt",
            "International Shipping\n\nCustomers are responsible for customs duties on international shipments.",
        ),
    ]
}

fn config() -> RetrievalConfig {
    RetrievalConfig { chunking: ChunkingConfig::new(80, 10), ..RetrievalConfig::default() }
}

fn hash64() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(64))
}

fn built(embedder: Arc<dyn Embedder>, docs: &[Document]) -> RetrievalSession {
    let mut session = RetrievalSession::new(config(), embedder).expect("session");
    session.build(docs).expect("build");
    session
}

#[tokio::test]
async fn snapshot_restores_an_equivalent_session() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    let original = built(Arc::new(HashEmbedder::new(64)), &corpus());

    let info = save_snapshot(&uri, &original).await?;
    assert_eq!(info.embedder_id, "hash:d64");
    assert_eq!(info.chunks, original.chunks()?.len());
    assert_eq!(read_snapshot_info(&uri).await?, Some(info));

    let restored = load_snapshot(&uri, config(), &hash64()).await?;
    assert_eq!(restored.chunks()?, original.chunks()?);
    let q = "who pays customs duties";
    assert_eq!(restored.retrieve(q)?, original.retrieve(q)?);
    Ok(())
}

#[tokio::test]
async fn saving_again_replaces_the_previous_snapshot() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    save_snapshot(&uri, &built(Arc::new(HashEmbedder::new(64)), &corpus())).await?;

    let smaller = vec![Document::plain("faq.txt", "Refunds arrive within five business days.")];
    let info = save_snapshot(&uri, &built(Arc::new(HashEmbedder::new(64)), &smaller)).await?;
    assert_eq!(info.chunks, 1);

    let restored = load_snapshot(&uri, config(), &hash64()).await?;
    assert_eq!(restored.chunks()?.len(), 1);
    assert_eq!(restored.chunks()?[0].source_document, "faq.txt");
    Ok(())
}

#[tokio::test]
async fn snapshot_rejects_a_different_embedder() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    save_snapshot(&uri, &built(Arc::new(HashEmbedder::new(64)), &corpus())).await?;

    let other: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
    let err = load_snapshot(&uri, config(), &other).await.err().expect("mismatch");
    assert!(err.to_string().contains("hash:d64"), "{err}");
    Ok(())
}

#[tokio::test]
async fn missing_snapshot_is_reported() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    assert_eq!(read_snapshot_info(&uri).await?, None);
    assert!(load_snapshot(&uri, config(), &hash64()).await.is_err());
    Ok(())
}

#[test]
fn cached_embedder_serves_repeats_from_the_cache() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    let plain = HashEmbedder::new(16);
    let cached = CachedEmbedder::open(HashEmbedder::new(16), &uri)?;
    assert_eq!(cached.embedder_id(), plain.embedder_id());

    let texts = vec!["refund window".to_string(), "customs duties".to_string(), "refund window".to_string()];
    let first = cached.embed_batch(&texts)?;
    assert_eq!(first, plain.embed_batch(&texts)?);
    assert_eq!(cached.stats().misses, 2);
    assert_eq!(cached.stats().hits, 0);

    let second = cached.embed_batch(&texts)?;
    assert_eq!(second, first);
    assert_eq!(cached.stats().misses, 2);
    assert_eq!(cached.stats().hits, 3);
    drop(cached);

    let reopened = CachedEmbedder::open(HashEmbedder::new(16), &uri)?;
    assert_eq!(reopened.embed(&texts[1])?, first[1]);
    assert_eq!(reopened.stats().hits, 1);
    Ok(())
}

#[test]
fn session_built_through_the_cache_matches_an_uncached_one() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let uri = tmp.path().to_string_lossy().to_string();
    let cached: Arc<dyn Embedder> = Arc::new(CachedEmbedder::open(HashEmbedder::new(64), &uri)?);
    let via_cache = built(cached, &corpus());
    let direct = built(Arc::new(HashEmbedder::new(64)), &corpus());
    let q = "refund within 30 days";
    assert_eq!(via_cache.retrieve(q)?, direct.retrieve(q)?);
    Ok(())
}

#[test]
fn failed_restore_keeps_the_cached_embedder_usable() -> anyhow::Result<()> {
    let cache_dir = tempfile::tempdir()?;
    let snapshot_dir = tempfile::tempdir()?;
    let uri = snapshot_dir.path().to_string_lossy().to_string();
    let cached: Arc<dyn Embedder> = Arc::new(CachedEmbedder::open(HashEmbedder::new(64), &cache_dir.path().to_string_lossy())?);

    let err = Runtime::new()?.block_on(load_snapshot(&uri, config(), &cached)).err().expect("nothing saved yet");
    assert!(err.to_string().contains("no snapshot found"), "{err}");
    assert_eq!(Arc::strong_count(&cached), 1);
    assert_eq!(cached.embed("customs duties")?.len(), 64);

    let session = built(Arc::clone(&cached), &corpus());
    Runtime::new()?.block_on(save_snapshot(&uri, &session))?;
    let restored = Runtime::new()?.block_on(load_snapshot(&uri, config(), &cached))?;
    let q = "who pays customs duties";
    assert_eq!(restored.retrieve(q)?, session.retrieve(q)?);
    Ok(())
}

#[tokio::test]
async fn cache_lookup_returns_only_requested_hashes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = open_db(&tmp.path().to_string_lossy()).await?;
    let table = cache_table_name(4);
    ensure_table(&conn, &table, build_cache_schema(4)).await?;

    let entries: Vec<(String, Vec<f32>)> =
        (0..300).map(|i| (content_hash(&format!("text {i}")), vec![i as f32; 4])).collect();
    put_many(&conn, &table, "hash:d4", 4, &entries).await?;
    put_many(&conn, &table, "other:d4", 4, &[(entries[0].0.clone(), vec![-1.0; 4])]).await?;

    let wanted: HashSet<String> =
        [entries[0].0.clone(), entries[299].0.clone(), content_hash("never stored")].into_iter().collect();
    let found = get_many(&conn, &table, "hash:d4", 4, &wanted).await?;
    assert_eq!(found.len(), 2);
    assert_eq!(found[&entries[0].0], vec![0.0; 4]);
    assert_eq!(found[&entries[299].0], vec![299.0; 4]);

    let all: HashSet<String> = entries.iter().map(|(h, _)| h.clone()).collect();
    assert_eq!(get_many(&conn, &table, "hash:d4", 4, &all).await?.len(), 300);
    Ok(())
}
