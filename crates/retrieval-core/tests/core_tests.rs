use std::fs;
use std::io::Write;
use tempfile::TempDir;

use retrieval_core::config::Config;
use retrieval_core::{Chunker, ChunkingConfig, DocumentFormat, DocumentLoader, Error};

#[test]
fn load_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let mut f = fs::File::create(dir.join("a.txt")).unwrap();
    writeln!(f, "Short text").unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("load");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source, "a.txt");
    assert_eq!(docs[0].format, DocumentFormat::PlainText);

    let chunks = Chunker::new(ChunkingConfig::default()).unwrap().split_all(&docs);
    assert_eq!(chunks.len(), 1, "one small document becomes one chunk");
    assert_eq!(chunks[0].text.trim(), "Short text");
}

#[test]
fn load_directory_sorted_nested_and_filtered() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("shipping")).unwrap();
    fs::write(dir.join("shipping/intl.md"), "customs duties").unwrap();
    fs::write(dir.join("refunds.txt"), "refund window").unwrap();
    fs::write(dir.join("notes.csv"), "ignored").unwrap();
    fs::write(dir.join("latin1.txt"), [0x63u8, 0x61, 0x66, 0xe9]).unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("load");
    let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
    assert_eq!(sources, vec!["latin1.txt", "refunds.txt", "shipping/intl.md"]);
    assert!(docs[0].text.starts_with("caf"), "invalid UTF-8 is decoded lossily");
}

#[test]
fn load_directory_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.txt"), "charlie delta").unwrap();

    let docs = DocumentLoader::with_limit(1).load_directory(dir).expect("load limited");
    assert_eq!(docs.len(), 1, "limited to one source document");
    assert_eq!(docs[0].source, "a.txt");
}

#[test]
fn missing_directory_is_an_io_error_and_empty_directory_is_not() {
    let tmp = TempDir::new().unwrap();
    let err = DocumentLoader::new().load_directory(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    let docs = DocumentLoader::new().load_directory(tmp.path()).expect("empty dir");
    assert!(docs.is_empty());
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[retrieval]\nalpha = 0.5\ntop_k = 10\n\n[retrieval.chunking]\ntarget_size = 300\noverlap = 50\n",
    )
    .unwrap();
    fs::write(tmp.path().join("config.test.toml"), "[retrieval]\nrerank_k = 4\n").unwrap();

    let config = Config::load_from(tmp.path(), "test").expect("load").retrieval().expect("retrieval");
    assert_eq!(config.alpha, 0.5);
    assert_eq!(config.top_k, 10);
    assert_eq!(config.rerank_k, 4);
    assert_eq!(config.chunking.target_size, 300);
    assert_eq!(config.chunking.overlap, 50);
    assert_eq!(config.chunking.separators.len(), 7, "unset fields keep defaults");
}

#[test]
fn invalid_config_file_fails_fast() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[retrieval]\ntop_k = 2\nrerank_k = 5\n").unwrap();
    let config = Config::load_from(tmp.path(), "prod").expect("load");
    assert!(config.retrieval().is_err());
}

#[test]
fn absent_retrieval_table_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = Config::load_from(tmp.path(), "dev").expect("load").retrieval().expect("defaults");
    assert_eq!(config.top_k, 8);
    assert_eq!(config.rerank_k, 3);
}

#[test]
fn unreadable_pdf_is_skipped_and_text_files_still_load() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("bad.pdf"), b"this is not a pdf document").unwrap();
    fs::write(dir.join("returns.txt"), "Returns are accepted within 30 days.").unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("a broken file does not fail the load");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source, "returns.txt");
    assert_eq!(docs[0].format, DocumentFormat::PlainText);

    let err = retrieval_core::loader::load_file(dir, &dir.join("bad.pdf")).unwrap_err();
    assert!(err.to_string().contains("PDF extraction failed"), "{err}");

    let missing = DocumentLoader::new().load_directory(&dir.join("missing")).unwrap_err();
    assert!(matches!(missing, Error::Io(_)));
}
