//! Configuration module for docchat.
//!
//! Handles loading and managing application settings and the answer prompt.

mod prompts;
mod settings;

pub use prompts::{Prompts, ANSWER_TEMPLATE, REFUSAL_PHRASE};
pub use settings::{
    ChunkingSettings, ClientProtocol, ClientSettings, EmbeddingSettings, GeneralSettings,
    IndexSettings, LlmSettings, ServerSettings, Settings, SourceSettings,
};
