//! Retrieval-augmented answering over the passage index.
//!
//! A question is embedded, the nearest passages are retrieved, their source
//! files are resolved to URLs, and the answer template is rendered and sent to
//! the language model as a token stream.

pub mod context;
mod response;

pub use context::{format_context, Retriever, RETRIEVAL_K};
pub use response::{AnswerStream, PreparedAnswer, RagEngine};

use crate::vector_store::SearchResult;

/// A passage returned for a question.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    /// Passage text.
    pub text: String,
    /// Name of the file the passage came from.
    pub source_filename: String,
    /// Similarity score.
    pub score: f32,
}

impl From<SearchResult> for RetrievedPassage {
    fn from(result: SearchResult) -> Self {
        Self {
            source_filename: result.passage.source_filename().to_string(),
            text: result.passage.content,
            score: result.score,
        }
    }
}
