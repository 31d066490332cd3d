//! Index command implementation.

use crate::chunking::TextSplitter;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::OpenAIEmbedder;
use crate::indexer::{collect_documents, FileOutcome, IndexReport, Indexer};
use crate::vector_store::{SqliteVectorStore, VectorStore};
use anyhow::Result;
use std::sync::Arc;

/// Run the index command.
pub async fn run_index(dir: &str, rebuild: bool, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Index, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let dir = Settings::expand_path(dir);
    let files = collect_documents(&dir)?;
    if files.is_empty() {
        Output::warning(&format!("No .txt, .md or .html files found in {}", dir.display()));
        return Ok(());
    }

    let index_path = settings.index_path();
    let store = Arc::new(SqliteVectorStore::create(&index_path)?);
    let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
    let splitter = TextSplitter::from_settings(&settings.chunking)?;
    let indexer = Indexer::new(embedder, store.clone(), splitter);

    let existing = indexer.indexed_sources().await?;
    let mut report = IndexReport::default();

    let pb = Output::progress_bar(files.len() as u64, "Indexing");
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        pb.set_message(name);

        match indexer.index_file(path, &existing, rebuild).await {
            Ok(FileOutcome::Indexed(count)) => {
                report.files_indexed += 1;
                report.passages_indexed += count;
            }
            Ok(FileOutcome::AlreadyIndexed) | Ok(FileOutcome::Empty) => report.files_skipped += 1,
            Err(e) => {
                pb.abandon();
                Output::error(&format!("Failed to index {}: {}", path.display(), e));
                return Err(e.into());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    Output::success(&format!(
        "Indexed {} passages from {} files",
        report.passages_indexed, report.files_indexed
    ));
    if report.files_skipped > 0 {
        Output::info(&format!(
            "Skipped {} files (already indexed or empty; use --rebuild to re-index)",
            report.files_skipped
        ));
    }
    Output::kv("Index", &index_path.display().to_string());
    Output::kv("Total passages", &store.passage_count().await?.to_string());

    Ok(())
}
