//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod index;
mod serve;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use index::run_index;
pub use serve::run_serve;

use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::Result;
use crate::llm::ChatModel;
use crate::rag::RagEngine;
use crate::sources::UrlMapping;
use crate::vector_store::{check_dimensions, SqliteVectorStore, VectorStore};
use std::sync::Arc;
use tracing::info;

/// Load the startup resources and assemble the answering engine.
///
/// A missing index or credential is an error, as is an index built with a
/// different embedding size; a missing URL mapping only means answers carry
/// no sources.
pub(crate) async fn open_engine(settings: &Settings) -> Result<RagEngine> {
    let store = Arc::new(SqliteVectorStore::open(&settings.index_path())?);
    info!("Index holds {} passages", store.passage_count().await?);

    let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
    check_dimensions(store.as_ref(), embedder.dimensions()).await?;
    let model = Arc::new(ChatModel::from_settings(&settings.llm)?);
    let mapping = Arc::new(UrlMapping::load(&settings.mapping_path())?);

    Ok(RagEngine::new(store, embedder, model, mapping))
}
