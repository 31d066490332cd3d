//! Passage retrieval and context assembly.

use super::RetrievedPassage;
use crate::embedding::Embedder;
use crate::error::{DocchatError, Result};
use crate::vector_store::VectorStore;
use std::sync::Arc;
use tracing::debug;

/// Number of passages retrieved per question.
pub const RETRIEVAL_K: usize = 4;

/// Finds the passages nearest to a question.
pub struct Retriever {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    limit: usize,
}

impl Retriever {
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vector_store,
            embedder,
            limit: RETRIEVAL_K,
        }
    }

    /// Retrieve passages for a query, most similar first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| DocchatError::Retrieval(e.to_string()))?;

        let results = self
            .vector_store
            .search(&query_embedding, self.limit)
            .await
            .map_err(|e| DocchatError::Retrieval(e.to_string()))?;

        debug!("Retrieved {} passages", results.len());

        Ok(results.into_iter().map(RetrievedPassage::from).collect())
    }
}

/// Join passage texts with blank lines. No passages gives an empty context.
pub fn format_context(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
