//! CLI module for docchat.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::ClientProtocol;
use clap::{Parser, Subcommand};

/// docchat - Document chat over a prebuilt passage index
///
/// Serves streamed, source-attributed answers over HTTP and chats with such a
/// service from the terminal.
#[derive(Parser, Debug)]
#[command(name = "docchat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level for the `docchat` target; `configured` applies without `-v`.
    pub fn log_level<'a>(&self, configured: &'a str) -> &'a str {
        match self.verbose {
            0 => configured,
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the chat HTTP service
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start an interactive chat session against a running service
    Chat {
        /// Chat endpoint URL (defaults to client.endpoint)
        #[arg(short, long, env = "DOCCHAT_ENDPOINT")]
        endpoint: Option<String>,

        /// API key sent in the api-key header
        #[arg(short = 'k', long, env = "DOCCHAT_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Response framing to request (events, legacy)
        #[arg(long)]
        protocol: Option<ClientProtocol>,
    },

    /// Ask a single question using the local index
    Ask {
        /// The question to ask
        question: String,
    },

    /// Build or extend the passage index from a directory of documents
    Index {
        /// Directory containing .txt, .md and .html files
        dir: String,

        /// Re-index files that are already in the index
        #[arg(long)]
        rebuild: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file if none exists
    Init,

    /// Show configuration file path
    Path,
}
