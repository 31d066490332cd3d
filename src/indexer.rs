//! Building the passage index from a directory of documents.

use crate::chunking::TextSplitter;
use crate::embedding::Embedder;
use crate::error::{DocchatError, Result};
use crate::vector_store::{check_dimensions, Passage, VectorStore};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// File extensions picked up when walking a corpus directory.
pub const DOCUMENT_EXTENSIONS: [&str; 4] = ["txt", "md", "html", "htm"];

/// Outcome of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Passages written for the file.
    Indexed(usize),
    /// Already in the index and not rebuilt.
    AlreadyIndexed,
    /// No text to index.
    Empty,
}

/// Totals for a directory run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub passages_indexed: usize,
}

/// Chunks, embeds and stores corpus documents.
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, splitter: TextSplitter) -> Self {
        Self {
            embedder,
            store,
            splitter,
        }
    }

    /// Sources already present in the index.
    pub async fn indexed_sources(&self) -> Result<HashSet<String>> {
        Ok(self
            .store
            .list_sources()
            .await?
            .into_iter()
            .map(|s| s.source)
            .collect())
    }

    /// Index every document under `dir`.
    #[instrument(skip(self))]
    pub async fn index_dir(&self, dir: &Path, rebuild: bool) -> Result<IndexReport> {
        let files = collect_documents(dir)?;
        check_dimensions(self.store.as_ref(), self.embedder.dimensions()).await?;
        let existing = self.indexed_sources().await?;
        let mut report = IndexReport::default();

        for path in files {
            match self.index_file(&path, &existing, rebuild).await? {
                FileOutcome::Indexed(count) => {
                    report.files_indexed += 1;
                    report.passages_indexed += count;
                }
                FileOutcome::AlreadyIndexed | FileOutcome::Empty => report.files_skipped += 1,
            }
        }

        info!(
            "Indexed {} passages from {} files ({} skipped)",
            report.passages_indexed, report.files_indexed, report.files_skipped
        );

        Ok(report)
    }

    /// Index one document. With `rebuild`, its existing passages are replaced.
    #[instrument(skip(self, existing))]
    pub async fn index_file(
        &self,
        path: &Path,
        existing: &HashSet<String>,
        rebuild: bool,
    ) -> Result<FileOutcome> {
        let source = path.display().to_string();

        if existing.contains(&source) {
            if !rebuild {
                debug!("{} is already indexed, skipping", source);
                return Ok(FileOutcome::AlreadyIndexed);
            }
            let removed = self.store.delete_by_source(&source).await?;
            debug!("Removed {} existing passages for {}", removed, source);
        }

        let text = self.read_document(path)?;
        let chunks = self.splitter.split(&text);
        if chunks.is_empty() {
            warn!("No text found in {}", source);
            return Ok(FileOutcome::Empty);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(DocchatError::Embedding(format!(
                "Expected {} embeddings for {}, got {}",
                chunks.len(),
                source,
                embeddings.len()
            )));
        }

        let passages: Vec<Passage> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Passage::new(source.clone(), chunk.content, chunk.order, embedding))
            .collect();

        let count = self.store.upsert_batch(&passages).await?;
        Ok(FileOutcome::Indexed(count))
    }

    /// Read a document as plain text, stripping markup from HTML files.
    pub fn read_document(&self, path: &Path) -> Result<String> {
        let raw = std::fs::read_to_string(path)?;
        if is_html(path) {
            Ok(html_to_text(&raw))
        } else {
            Ok(raw)
        }
    }
}

/// Recursively list indexable documents under `dir`, sorted by path.
pub fn collect_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DocchatError::InvalidInput(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && has_document_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn has_document_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DOCUMENT_EXTENSIONS.iter().any(|d| d.eq_ignore_ascii_case(e)))
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

/// Readable text of a captured web page, as markdown.
fn html_to_text(html: &str) -> String {
    html2md::parse_html(html).trim().to_string()
}
