//! docchat - Document chat with streamed, source-attributed answers
//!
//! A retrieval-augmented chat service over a prebuilt passage index, and a
//! terminal client that renders answers while they stream in.
//!
//! # Overview
//!
//! docchat allows you to:
//! - Build a passage index from a directory of text, markdown and HTML files
//! - Serve answers over HTTP, streamed token by token with their source URLs
//! - Chat with such a service from the terminal, with a live typing effect
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management and the answer prompt
//! - `chunking` - Splitting documents into passages
//! - `embedding` - Embedding generation
//! - `vector_store` - Passage index abstraction
//! - `indexer` - Index building
//! - `sources` - Filename to URL mapping
//! - `llm` - Streaming language model
//! - `rag` - Retrieval and prompt assembly
//! - `protocol` - Response framings and their incremental decoders
//! - `server` - HTTP chat service
//! - `client` - Streaming chat client and transcript
//!
//! # Example
//!
//! ```rust,no_run
//! use docchat::client::{ChatClient, Transcript};
//! use docchat::protocol::WireFormat;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ChatClient::new("http://localhost:8000/api/chat/", None, WireFormat::Events)?;
//!
//!     let (transcript, answer) = client
//!         .converse(Transcript::new(), "What services does i2e offer?", |snapshot| {
//!             eprintln!("{} chars so far", snapshot.text.len());
//!         })
//!         .await;
//!
//!     println!("{}", answer?.text);
//!     println!("{} turns", transcript.len());
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod client;
pub mod config;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod openai;
pub mod protocol;
pub mod rag;
pub mod server;
pub mod sources;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DocchatError, Result};
