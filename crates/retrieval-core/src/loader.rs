use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::types::{Document, DocumentFormat};

const TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Loads `.txt`, `.md` and `.pdf` files under a directory as documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    limit: Option<usize>,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    /// Keep only the first `limit` files in path order.
    pub fn with_limit(limit: usize) -> Self { Self { limit: Some(limit) } }

    pub fn load_directory(&self, root: &Path) -> Result<Vec<Document>> {
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("document directory not found: {}", root.display()),
            )
            .into());
        }
        let mut files = list_document_files(root);
        if files.is_empty() {
            warn!(dir = %root.display(), "no .txt/.md/.pdf files found");
            return Ok(Vec::new());
        }
        if let Some(limit) = self.limit {
            files.truncate(limit);
        }
        let mut docs = Vec::with_capacity(files.len());
        for path in &files {
            match load_file(root, path) {
                Ok(doc) => {
                    info!(source = %doc.source, chars = doc.text.chars().count(), "loaded document");
                    docs.push(doc);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load document, skipping"),
            }
        }
        info!(files = files.len(), documents = docs.len(), "document load complete");
        Ok(docs)
    }
}

pub fn load_file(root: &Path, path: &Path) -> anyhow::Result<Document> {
    let source = source_name(root, path);
    let format = match extension(path).as_deref() {
        Some("pdf") => DocumentFormat::PdfText,
        _ => DocumentFormat::PlainText,
    };
    let text = match format {
        DocumentFormat::PdfText => pdf_extract::extract_text(path)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed for {}: {}", path.display(), e))?,
        DocumentFormat::PlainText => read_text_lossy(path)?,
    };
    Ok(Document { source, text, format })
}

fn read_text_lossy(path: &Path) -> anyhow::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

fn source_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase())
}

fn list_document_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        match extension(path).as_deref() {
            Some(ext) if ext == "pdf" || TEXT_EXTENSIONS.contains(&ext) => files.push(path.to_path_buf()),
            _ => {}
        }
    }
    files.sort();
    files
}
