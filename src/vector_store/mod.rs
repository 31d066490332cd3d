//! Vector store abstraction for docchat.
//!
//! Provides a trait-based interface over the prebuilt passage index.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::error::{DocchatError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A corpus passage stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Unique passage ID.
    pub id: Uuid,
    /// Path of the file the passage was cut from, as recorded at indexing time.
    pub source: String,
    /// Text content of this passage.
    pub content: String,
    /// Order of this passage within its source file.
    pub chunk_order: i32,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// When this passage was indexed.
    pub indexed_at: DateTime<Utc>,
}

impl Passage {
    /// Create a new passage.
    pub fn new(source: String, content: String, chunk_order: i32, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            content,
            chunk_order,
            embedding,
            indexed_at: Utc::now(),
        }
    }

    /// Final path component of the source, accepting either separator.
    pub fn source_filename(&self) -> &str {
        source_filename(&self.source)
    }
}

/// Final path component of a recorded source path.
pub fn source_filename(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

/// A search result with score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched passage.
    pub passage: Passage,
    /// Similarity score (higher is better).
    pub score: f32,
}

/// Summary of one indexed source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSource {
    /// Recorded source path.
    pub source: String,
    /// Number of passages cut from it.
    pub passage_count: u32,
    /// Latest indexing time among its passages.
    pub indexed_at: DateTime<Utc>,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Bulk upsert passages.
    async fn upsert_batch(&self, passages: &[Passage]) -> Result<usize>;

    /// Return the `limit` most similar passages, best first.
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// Delete all passages from a source.
    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// List indexed sources.
    async fn list_sources(&self) -> Result<Vec<IndexedSource>>;

    /// Get total passage count.
    async fn passage_count(&self) -> Result<usize>;

    /// Length of the stored embeddings, or `None` for an empty index.
    async fn embedding_dimensions(&self) -> Result<Option<usize>>;
}

/// Fail unless the index was built in the embedder's vector space.
pub async fn check_dimensions(store: &dyn VectorStore, expected: usize) -> Result<()> {
    match store.embedding_dimensions().await? {
        Some(actual) if actual != expected => Err(DocchatError::VectorStore(format!(
            "Index embeddings have {} dimensions but the embedder produces {}. \
             Rebuild the index with 'docchat index <dir> --rebuild'.",
            actual, expected
        ))),
        _ => Ok(()),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Score a passage against a query embedding of the same length.
pub(crate) fn score(query_embedding: &[f32], passage: Passage) -> Result<SearchResult> {
    if query_embedding.len() != passage.embedding.len() {
        return Err(DocchatError::VectorStore(format!(
            "Query embedding has {} dimensions but passage {} has {}",
            query_embedding.len(),
            passage.id,
            passage.embedding.len()
        )));
    }

    Ok(SearchResult {
        score: cosine_similarity(query_embedding, &passage.embedding),
        passage,
    })
}

/// Sort scored results best-first and keep the top `limit`.
pub(crate) fn rank(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}
