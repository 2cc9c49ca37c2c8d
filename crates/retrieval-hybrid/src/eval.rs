//! Retrieval evaluation over a labelled question set.
//!
//! Each question says whether the corpus should answer it. A run records what
//! the session retrieved and whether that matches the label: answerable
//! questions need at least one hit, unanswerable ones need none, and
//! partially answerable ones are recorded without a pass/fail judgement.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use retrieval_core::error::Result;
use retrieval_core::types::{ChunkId, Coverage, RetrievalResult};

use crate::session::{RetrievalMode, RetrievalSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Answerable,
    PartiallyAnswerable,
    Unanswerable,
}

impl ExpectedOutcome {
    pub fn accepts(self, result: &RetrievalResult) -> bool {
        match self {
            Self::Answerable => !result.is_empty(),
            Self::Unanswerable => result.is_empty(),
            Self::PartiallyAnswerable => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub id: u32,
    pub question: String,
    pub category: String,
    #[serde(alias = "expected_type")]
    pub expected: ExpectedOutcome,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSource {
    pub source_document: String,
    pub chunk_id: ChunkId,
    pub fused_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRow {
    pub id: u32,
    pub question: String,
    pub category: String,
    pub expected: ExpectedOutcome,
    pub hits: usize,
    pub coverage: Coverage,
    pub retrieved: Vec<RetrievedSource>,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub total: usize,
    pub passed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub embedder_id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub rows: Vec<EvalRow>,
    pub categories: BTreeMap<String, CategorySummary>,
}

impl EvalReport {
    pub fn total(&self) -> usize { self.rows.len() }

    pub fn passed(&self) -> usize { self.rows.iter().filter(|r| r.passed).count() }

    pub fn failures(&self) -> impl Iterator<Item = &EvalRow> {
        self.rows.iter().filter(|r| !r.passed)
    }
}

/// Read a JSON array of questions.
pub fn load_questions(path: &Path) -> anyhow::Result<Vec<EvalQuestion>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let questions: Vec<EvalQuestion> =
        serde_json::from_str(&raw).with_context(|| format!("parsing questions from {}", path.display()))?;
    info!(path = %path.display(), questions = questions.len(), "loaded evaluation questions");
    Ok(questions)
}

pub fn evaluate(session: &RetrievalSession, questions: &[EvalQuestion]) -> Result<EvalReport> {
    evaluate_with(session, questions, RetrievalMode::Hybrid)
}

/// Run every question through `session`. A retrieval error aborts the run.
pub fn evaluate_with(session: &RetrievalSession, questions: &[EvalQuestion], mode: RetrievalMode) -> Result<EvalReport> {
    let started_at = Utc::now();
    let mut rows = Vec::with_capacity(questions.len());
    let mut categories: BTreeMap<String, CategorySummary> = BTreeMap::new();

    for q in questions {
        let result = session.retrieve_with(&q.question, mode)?;
        let passed = q.expected.accepts(&result);
        if !passed {
            warn!(id = q.id, expected = ?q.expected, hits = result.len(), "evaluation question failed");
        }
        let summary = categories.entry(q.category.clone()).or_default();
        summary.total += 1;
        summary.passed += usize::from(passed);

        rows.push(EvalRow {
            id: q.id,
            question: q.question.clone(),
            category: q.category.clone(),
            expected: q.expected,
            hits: result.len(),
            coverage: result.coverage(),
            retrieved: result
                .hits
                .iter()
                .map(|h| RetrievedSource {
                    source_document: h.source_document.clone(),
                    chunk_id: h.chunk_id,
                    fused_score: h.fused_score,
                })
                .collect(),
            passed,
            timestamp: Utc::now(),
        });
    }

    let report = EvalReport {
        embedder_id: session.embedder_id().to_string(),
        mode: match mode {
            RetrievalMode::Hybrid => "hybrid".to_string(),
            RetrievalMode::LexicalOnly => "lexical_only".to_string(),
        },
        started_at,
        rows,
        categories,
    };
    info!(total = report.total(), passed = report.passed(), "evaluation complete");
    Ok(report)
}
