//! In-memory vector store implementation.
//!
//! Useful for testing and small corpora.

use super::{rank, score, IndexedSource, Passage, SearchResult, VectorStore};
use crate::error::{DocchatError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// In-memory vector store.
pub struct MemoryVectorStore {
    passages: RwLock<HashMap<Uuid, Passage>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store pre-populated with passages.
    pub fn with_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages: RwLock::new(passages.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, Passage>>> {
        self.passages
            .read()
            .map_err(|e| DocchatError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, Passage>>> {
        self.passages
            .write()
            .map_err(|e| DocchatError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert_batch(&self, passages: &[Passage]) -> Result<usize> {
        let mut store = self.write()?;
        for passage in passages {
            store.insert(passage.id, passage.clone());
        }
        Ok(passages.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let passages = self.read()?;

        let results = passages
            .values()
            .map(|passage| score(query_embedding, passage.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(rank(results, limit))
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut passages = self.write()?;
        let initial_len = passages.len();
        passages.retain(|_, p| p.source != source);
        Ok(initial_len - passages.len())
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let passages = self.read()?;

        let mut source_map: HashMap<String, IndexedSource> = HashMap::new();

        for passage in passages.values() {
            let entry = source_map
                .entry(passage.source.clone())
                .or_insert_with(|| IndexedSource {
                    source: passage.source.clone(),
                    passage_count: 0,
                    indexed_at: passage.indexed_at,
                });

            entry.passage_count += 1;
            if passage.indexed_at > entry.indexed_at {
                entry.indexed_at = passage.indexed_at;
            }
        }

        let mut sources: Vec<IndexedSource> = source_map.into_values().collect();
        sources.sort_by(|a, b| a.source.cmp(&b.source));

        Ok(sources)
    }

    async fn passage_count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn embedding_dimensions(&self) -> Result<Option<usize>> {
        Ok(self.read()?.values().next().map(|p| p.embedding.len()))
    }
}
