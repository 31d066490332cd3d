//! RAG answer generation.

use super::{format_context, Retriever, RetrievedPassage};
use crate::config::Prompts;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::llm::{LanguageModel, TokenStream};
use crate::sources::UrlMapping;
use crate::vector_store::VectorStore;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Everything computed for a question before generation starts.
#[derive(Debug, Clone)]
pub struct PreparedAnswer {
    /// The question as received.
    pub query: String,
    /// Retrieved passages, most similar first.
    pub passages: Vec<RetrievedPassage>,
    /// Passage texts joined with blank lines.
    pub context: String,
    /// Rendered answer template.
    pub prompt: String,
    /// Deduplicated source URLs of the passages.
    pub sources: Vec<String>,
}

/// An answer whose text is still being generated.
pub struct AnswerStream {
    pub query: String,
    pub sources: Vec<String>,
    pub tokens: TokenStream,
}

/// RAG engine for question answering.
///
/// Holds only read-only state; every question is answered from scratch.
pub struct RagEngine {
    retriever: Retriever,
    model: Arc<dyn LanguageModel>,
    mapping: Arc<UrlMapping>,
}

impl RagEngine {
    /// Create a new RAG engine.
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        mapping: Arc<UrlMapping>,
    ) -> Self {
        Self {
            retriever: Retriever::new(vector_store, embedder),
            model,
            mapping,
        }
    }

    /// Retrieve passages, resolve sources and render the prompt.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn prepare(&self, query: &str) -> Result<PreparedAnswer> {
        info!("Processing question: {}", query);

        let passages = self.retriever.retrieve(query).await?;
        let sources = self
            .mapping
            .resolve(passages.iter().map(|p| p.source_filename.as_str()));
        let context = format_context(&passages);
        let prompt = Prompts::answer(&context, query);

        debug!(
            "Prepared prompt from {} passages with {} sources",
            passages.len(),
            sources.len()
        );

        Ok(PreparedAnswer {
            query: query.to_string(),
            passages,
            context,
            prompt,
            sources,
        })
    }

    /// Prepare a question and open the model's token stream for it.
    pub async fn answer(&self, query: &str) -> Result<AnswerStream> {
        let prepared = self.prepare(query).await?;
        let tokens = self.model.stream(&prepared.prompt).await?;

        Ok(AnswerStream {
            query: prepared.query,
            sources: prepared.sources,
            tokens,
        })
    }

    /// Name of the underlying language model.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REFUSAL_PHRASE;
    use crate::error::DocchatError;
    use crate::testing::{passage, FailingEmbedder, LetterEmbedder, ScriptedModel};
    use crate::vector_store::MemoryVectorStore;
    use futures::StreamExt;
    use std::collections::HashMap;

    fn engine(passages: Vec<crate::vector_store::Passage>, model: Arc<ScriptedModel>) -> RagEngine {
        let mapping = UrlMapping::new(HashMap::from([
            ("a.pdf".to_string(), "https://i2e.com/services".to_string()),
            ("b.pdf".to_string(), "https://i2e.com/services".to_string()),
        ]));
        RagEngine::new(
            Arc::new(MemoryVectorStore::with_passages(passages)),
            Arc::new(LetterEmbedder),
            model,
            Arc::new(mapping),
        )
    }

    #[tokio::test]
    async fn test_prepare_dedups_sources() {
        let passages = vec![
            passage("corpus/a.pdf", "i2e offers consulting services"),
            passage("corpus/b.pdf", "services include analytics"),
        ];
        let engine = engine(passages, Arc::new(ScriptedModel::new(&[])));

        let prepared = engine.prepare("What services does i2e offer?").await.unwrap();
        assert_eq!(prepared.passages.len(), 2);
        assert_eq!(prepared.sources, vec!["https://i2e.com/services"]);
        assert!(prepared.context.contains("\n\n"));
        assert!(prepared.prompt.contains("Question: What services does i2e offer?"));
        assert!(prepared.prompt.contains(REFUSAL_PHRASE));
    }

    #[tokio::test]
    async fn test_no_passages_gives_empty_context_and_sources() {
        let engine = engine(Vec::new(), Arc::new(ScriptedModel::new(&[])));
        let prepared = engine.prepare("anything").await.unwrap();
        assert!(prepared.passages.is_empty());
        assert_eq!(prepared.context, "");
        assert!(prepared.sources.is_empty());
        assert!(prepared.prompt.contains("Context: \n\nQuestion: anything"));
    }

    #[tokio::test]
    async fn test_unmapped_sources_are_dropped() {
        let passages = vec![passage("corpus/unknown.txt", "something")];
        let engine = engine(passages, Arc::new(ScriptedModel::new(&[])));
        let prepared = engine.prepare("something").await.unwrap();
        assert_eq!(prepared.passages.len(), 1);
        assert!(prepared.sources.is_empty());
    }

    async fn collect(stream: AnswerStream) -> Result<String> {
        let mut tokens = stream.tokens;
        let mut text = String::new();
        while let Some(token) = tokens.next().await {
            text.push_str(&token?);
        }
        Ok(text)
    }

    #[tokio::test]
    async fn test_answer_sends_prompt_and_streams_tokens() {
        let model = Arc::new(ScriptedModel::new(&["We offer ", "consulting."]));
        let passages = vec![passage("a.pdf", "i2e offers consulting")];
        let engine = engine(passages, model.clone());

        let stream = engine.answer("What does i2e offer?").await.unwrap();
        assert_eq!(stream.query, "What does i2e offer?");
        assert_eq!(stream.sources, vec!["https://i2e.com/services"]);
        assert_eq!(collect(stream).await.unwrap(), "We offer consulting.");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Context: i2e offers consulting"));
    }

    #[tokio::test]
    async fn test_answer_stream_surfaces_model_failure() {
        let model = Arc::new(ScriptedModel::new(&["a", "b"]).failing_after(1));
        let engine = engine(Vec::new(), model);
        let stream = engine.answer("q").await.unwrap();
        assert!(collect(stream).await.is_err());
    }

    #[tokio::test]
    async fn test_index_in_other_vector_space_is_an_error() {
        let stale = crate::vector_store::Passage::new(
            "corpus/a.pdf".to_string(),
            "i2e offers consulting".to_string(),
            0,
            vec![1.0, 0.0, 0.0],
        );
        let engine = engine(vec![stale], Arc::new(ScriptedModel::new(&[])));

        let err = engine.prepare("What does i2e offer?").await.unwrap_err();
        assert!(matches!(err, DocchatError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_retrieval_failure_aborts_before_model() {
        let model = Arc::new(ScriptedModel::new(&["never"]));
        let engine = RagEngine::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(FailingEmbedder),
            model.clone(),
            Arc::new(UrlMapping::default()),
        );

        let err = engine.answer("q").await.err().unwrap();
        assert!(matches!(err, DocchatError::Retrieval(_)));
        assert!(model.prompts().is_empty());
    }
}
