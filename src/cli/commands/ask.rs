//! Ask command implementation.

use super::open_engine;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::AnswerStream;
use anyhow::Result;
use futures::StreamExt;
use std::io::{self, Write};

/// Run the ask command.
pub async fn run_ask(question: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let engine = open_engine(&settings).await?;

    let spinner = Output::spinner("Searching knowledge base...");

    let AnswerStream {
        sources,
        mut tokens,
        ..
    } = match engine.answer(question).await {
        Ok(answer) => {
            spinner.finish_and_clear();
            answer
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    };

    let mut stdout = io::stdout();
    println!();
    while let Some(token) = tokens.next().await {
        match token {
            Ok(text) => {
                print!("{}", text);
                stdout.flush()?;
            }
            Err(e) => {
                println!();
                Output::error(&format!("Answer interrupted: {}", e));
                return Err(e.into());
            }
        }
    }
    println!();

    Output::sources(&sources);

    Ok(())
}
