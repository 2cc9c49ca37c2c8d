use retrieval_core::{Chunker, ChunkingConfig, Document, LexicalConfig};
use retrieval_text::LexicalIndex;

fn policy_corpus() -> Vec<Document> {
    vec![
        Document::plain(
            "refund_policy.txt",
            "Refund Eligibility\n\nCustomers may request a refund within 30 days of receiving a product. \
             Proof of purchase is required for every refund.\n\nDigital and downloadable products are non-refundable.",
        ),
        Document::plain(
            "shipping_policy.txt",
            "International Shipping\n\nCustomers are responsible for customs duties on international shipments.\n\n\
             Warranty claims must be initiated through the support portal.",
        ),
        Document::plain("cancellation_policy.txt", "Orders may be cancelled within 24 hours of placement."),
    ]
}

#[test]
fn bm25_full_flow() {
    let chunker = Chunker::new(ChunkingConfig::new(120, 20)).expect("chunker");
    let chunks = chunker.split_all(&policy_corpus());
    assert!(chunks.len() >= 5, "corpus splits into several chunks, got {}", chunks.len());

    let index = LexicalIndex::build(&chunks, &LexicalConfig::default());
    assert_eq!(index.len(), chunks.len());

    for (query, expected_source) in [
        ("customs duties international", "shipping_policy.txt"),
        ("downloadable products refundable", "refund_policy.txt"),
        ("cancel orders hours", "cancellation_policy.txt"),
    ] {
        let hits = index.search(query, 5);
        assert!(!hits.is_empty(), "q='{query}' has hits");
        let top = &chunks[hits[0].chunk_id as usize];
        eprintln!("q='{}' -> {} hits, top={} ({:.3})", query, hits.len(), top.source_document, hits[0].score);
        assert_eq!(top.source_document, expected_source);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    assert!(index.search("Do you ship to Mars?", 5).is_empty());
}
