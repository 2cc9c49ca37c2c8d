//! Retrieval CLI: build, persist, query and evaluate a hybrid retrieval
//! session over a directory of policy documents.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;
use tracing::info;

use retrieval_core::config::{resolve_with_base, Config};
use retrieval_core::{DocumentLoader, Embedder, RetrievalConfig, RetrievalResult};
use retrieval_embed::{get_default_embedder, use_fake_embeddings, HashEmbedder, HASH_EMBEDDING_DIM};
use retrieval_hybrid::{evaluate_with, load_questions, RetrievalMode, RetrievalSession};
use retrieval_store::{load_snapshot, read_snapshot_info, save_snapshot, CachedEmbedder};

#[derive(Parser)]
#[command(name = "retrieval-cli")]
#[command(about = "Hybrid (vector + BM25) retrieval over local documents")]
struct Cli {
    /// Use the deterministic hash embedder instead of the local model
    #[arg(long, global = true)]
    fake_embeddings: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    trace_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, chunk and embed a document directory, then save a snapshot
    Ingest {
        /// Document directory (default: data.docs_dir)
        dir: Option<PathBuf>,
        /// Snapshot location (default: data.snapshot_uri)
        #[arg(long)]
        snapshot: Option<String>,
        /// Only load the first N files
        #[arg(long)]
        limit: Option<usize>,
        /// Skip the embedding cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Retrieve context for one question
    Query {
        /// Question text
        text: String,
        #[command(flatten)]
        source: SourceArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a labelled question set and report pass rates
    Eval {
        /// JSON array of questions
        questions: PathBuf,
        #[command(flatten)]
        source: SourceArgs,
        /// Write the full report as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show what a snapshot was built with
    Info {
        #[arg(long)]
        snapshot: Option<String>,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Restore the session from this snapshot
    #[arg(long, conflicts_with = "docs")]
    snapshot: Option<String>,
    /// Build the session in memory from this document directory
    #[arg(long)]
    docs: Option<PathBuf>,
    /// BM25 only; the embedder is not called for the query
    #[arg(long)]
    lexical_only: bool,
}

impl SourceArgs {
    fn mode(&self) -> RetrievalMode {
        if self.lexical_only { RetrievalMode::LexicalOnly } else { RetrievalMode::Hybrid }
    }
}

struct Settings {
    base: PathBuf,
    retrieval: RetrievalConfig,
    docs_dir: String,
    snapshot_uri: String,
    cache_uri: Option<String>,
}

impl Settings {
    fn load() -> Result<Self> {
        let config = Config::load().context("loading configuration")?;
        Ok(Self {
            base: std::env::current_dir()?,
            retrieval: config.retrieval()?,
            docs_dir: config.get_or("data.docs_dir", "data/policies".to_string())?,
            snapshot_uri: config.get_or("data.snapshot_uri", "data/index/lancedb".to_string())?,
            cache_uri: config.get_or("data.cache_uri", None)?,
        })
    }

    fn path(&self, p: &str) -> PathBuf {
        resolve_with_base(&self.base, p)
    }

    fn uri(&self, p: &str) -> String {
        self.path(p).to_string_lossy().to_string()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.trace_log.as_deref())?;
    let settings = Settings::load()?;

    match cli.command {
        Command::Ingest { dir, snapshot, limit, no_cache } => {
            let dir = dir.unwrap_or_else(|| settings.path(&settings.docs_dir));
            let uri = settings.uri(snapshot.as_deref().unwrap_or(&settings.snapshot_uri));
            let cache = if no_cache { None } else { settings.cache_uri.as_deref().map(|c| settings.uri(c)) };
            let embedder = make_embedder(cli.fake_embeddings, cache.as_deref())?;
            let session = build_session(&settings, &dir, limit, embedder, true)?;
            let saved = Runtime::new()?.block_on(save_snapshot(&uri, &session))?;
            println!("Ingested {} chunks into {} ({}, d{})", saved.chunks, uri, saved.embedder_id, saved.dim);
        }
        Command::Query { text, source, json } => {
            let embedder = make_embedder(cli.fake_embeddings, settings.cache_uri.as_deref().map(|c| settings.uri(c)).as_deref())?;
            let session = open_session(&settings, &source, embedder)?;
            let result = session.retrieve_with(&text, source.mode())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Command::Eval { questions, source, out } => {
            let questions = load_questions(&questions)?;
            let embedder = make_embedder(cli.fake_embeddings, settings.cache_uri.as_deref().map(|c| settings.uri(c)).as_deref())?;
            let session = open_session(&settings, &source, embedder)?;
            let report = evaluate_with(&session, &questions, source.mode())?;
            for row in &report.rows {
                let mark = if row.passed { "PASS" } else { "FAIL" };
                println!("[{mark}] #{:<3} {:<14} {:?} hits={} {}", row.id, row.category, row.expected, row.hits, row.question);
            }
            for (category, summary) in &report.categories {
                println!("{category}: {}/{}", summary.passed, summary.total);
            }
            println!("Total: {}/{} passed", report.passed(), report.total());
            if let Some(out) = out {
                std::fs::write(&out, serde_json::to_string_pretty(&report)?)
                    .with_context(|| format!("writing {}", out.display()))?;
                println!("Report written to {}", out.display());
            }
        }
        Command::Info { snapshot } => {
            let uri = settings.uri(snapshot.as_deref().unwrap_or(&settings.snapshot_uri));
            match Runtime::new()?.block_on(read_snapshot_info(&uri))? {
                Some(info) => println!(
                    "{uri}\n  embedder: {}\n  dim: {}\n  chunks: {}\n  saved: {}",
                    info.embedder_id, info.dim, info.chunks, info.saved_at
                ),
                None => println!("No snapshot at {uri}"),
            }
        }
    }
    Ok(())
}

fn init_tracing(trace_log: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match trace_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening trace log {}", path.display()))?;
            tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn make_embedder(fake: bool, cache_uri: Option<&str>) -> Result<Arc<dyn Embedder>> {
    let base: Box<dyn Embedder> = if fake || use_fake_embeddings() {
        Box::new(HashEmbedder::new(HASH_EMBEDDING_DIM))
    } else {
        get_default_embedder()?
    };
    match cache_uri {
        Some(uri) => {
            info!(uri, "embedding cache enabled");
            Ok(Arc::new(CachedEmbedder::open(base, uri)?))
        }
        None => Ok(Arc::from(base)),
    }
}

fn build_session(
    settings: &Settings,
    dir: &Path,
    limit: Option<usize>,
    embedder: Arc<dyn Embedder>,
    show_progress: bool,
) -> Result<RetrievalSession> {
    let loader = limit.map_or_else(DocumentLoader::new, DocumentLoader::with_limit);
    let documents = loader.load_directory(dir)?;
    if documents.is_empty() {
        bail!("no documents found in {}", dir.display());
    }
    let mut session = RetrievalSession::new(settings.retrieval.clone(), embedder)?;
    let progress = if show_progress {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };
    let stats = session.build_with_progress(&documents, &progress)?;
    info!(documents = stats.documents, chunks = stats.chunks, "session ready");
    Ok(session)
}

fn open_session(settings: &Settings, source: &SourceArgs, embedder: Arc<dyn Embedder>) -> Result<RetrievalSession> {
    if let Some(docs) = &source.docs {
        return build_session(settings, docs, None, embedder, false);
    }
    let uri = settings.uri(source.snapshot.as_deref().unwrap_or(&settings.snapshot_uri));
    // `embedder` outlives the runtime; a cached embedder must not be dropped inside it.
    let session = Runtime::new()?.block_on(load_snapshot(&uri, settings.retrieval.clone(), &embedder))?;
    Ok(session)
}

fn print_result(result: &RetrievalResult) {
    if result.is_empty() {
        println!("No relevant content found for \"{}\".", result.query);
        return;
    }
    println!("{} of {} requested chunks ({:?} coverage)", result.len(), result.requested, result.coverage());
    for (rank, hit) in result.hits.iter().enumerate() {
        println!(
            "\n#{} {} [chunk {}, chars {}..{}] fused={:.3} semantic={:.3} lexical={:.3}",
            rank + 1,
            hit.source_document,
            hit.chunk_id,
            hit.char_start,
            hit.char_end,
            hit.fused_score,
            hit.semantic_score,
            hit.lexical_score
        );
        println!("{}", hit.text.trim());
    }
}
