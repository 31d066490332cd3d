//! Streaming chat-completion provider.

use crate::config::LlmSettings;
use crate::error::{DocchatError, Result};
use crate::openai::{api_key_from_env, create_client};
use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::{debug, instrument};

/// Stream of generated text fragments, in arrival order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A language model that can stream a completion for a prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Open a token stream for the prompt.
    ///
    /// Errors returned here happen before any token is produced; errors inside
    /// the stream happen mid-generation.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;

    /// Model identifier, for logging.
    fn name(&self) -> &str;
}

/// Chat-completions model on an OpenAI-compatible endpoint (Groq by default).
pub struct ChatModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl ChatModel {
    /// Create a model from settings, reading the credential from the environment.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let api_key = api_key_from_env(&settings.api_key_env)?;
        Ok(Self {
            client: create_client(&settings.api_base, &api_key)?,
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for ChatModel {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| DocchatError::Llm(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![message.into()])
            .temperature(self.temperature)
            .build()
            .map_err(|e| DocchatError::Llm(e.to_string()))?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| DocchatError::OpenAI(format!("Failed to open completion stream: {}", e)))?;

        debug!("Completion stream opened");

        let tokens = stream.filter_map(|item| async move {
            match item {
                Ok(response) => {
                    let text: String = response
                        .choices
                        .into_iter()
                        .filter_map(|choice| choice.delta.content)
                        .collect();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(DocchatError::OpenAI(format!(
                    "Completion stream failed: {}",
                    e
                )))),
            }
        });

        Ok(Box::pin(tokens))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
