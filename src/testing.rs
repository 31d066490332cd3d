//! In-process fakes for the embedding and language model seams.

use crate::embedding::Embedder;
use crate::error::{DocchatError, Result};
use crate::llm::{LanguageModel, TokenStream};
use crate::vector_store::Passage;
use async_trait::async_trait;
use std::sync::Mutex;

/// Embeds text as normalized letter counts, so texts sharing words score high.
pub struct LetterEmbedder;

impl LetterEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; 26];
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            counts[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        counts
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        26
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(DocchatError::Embedding("embedding service unavailable".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(DocchatError::Embedding("embedding service unavailable".to_string()))
    }

    fn dimensions(&self) -> usize {
        26
    }
}

/// Model that replays fixed tokens and records the prompts it received.
pub struct ScriptedModel {
    tokens: Vec<String>,
    fail_after: Option<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            fail_after: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail mid-stream after emitting `count` tokens.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut items: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
        if let Some(count) = self.fail_after {
            items.truncate(count);
            items.push(Err(DocchatError::OpenAI("connection reset".to_string())));
        }

        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Passage embedded with [`LetterEmbedder`].
pub fn passage(source: &str, content: &str) -> Passage {
    Passage::new(
        source.to_string(),
        content.to_string(),
        0,
        LetterEmbedder::vector(content),
    )
}
