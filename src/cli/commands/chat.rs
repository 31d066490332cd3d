//! Interactive chat command.

use crate::cli::Output;
use crate::client::{Answer, ChatClient, LiveText, Redraw, Transcript};
use crate::config::{ClientProtocol, Settings};
use crate::error::Result;
use console::{style, Term};
use indicatif::ProgressBar;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Run the interactive chat command.
pub async fn run_chat(
    endpoint: Option<String>,
    api_key: Option<String>,
    protocol: Option<ClientProtocol>,
    settings: Settings,
) -> Result<()> {
    let mut client_settings = settings.client.clone();
    if let Some(endpoint) = endpoint {
        client_settings.endpoint = endpoint;
    }
    if api_key.is_some() {
        client_settings.api_key = api_key;
    }
    if let Some(protocol) = protocol {
        client_settings.protocol = protocol;
    }

    let mut client = ChatClient::from_settings(&client_settings)?;
    let mut transcript = Transcript::new();

    println!("\n{}", style("docchat").bold().cyan());
    println!(
        "{}",
        style("Type your questions, or 'exit' to quit. Use 'clear' to start over, 'history' to review.").dim()
    );
    println!(
        "{}\n",
        style(format!(
            "Endpoint: {} ({} framing). Change with /endpoint <url> and /key <key>.",
            client.endpoint(),
            client_settings.protocol
        ))
        .dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let term = Term::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!();
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            transcript = Transcript::new();
            Output::info("Conversation cleared.");
            continue;
        }

        if input.eq_ignore_ascii_case("history") {
            if transcript.is_empty() {
                Output::info("No messages yet.");
            }
            for turn in transcript.turns() {
                Output::turn(turn);
            }
            continue;
        }

        if let Some(url) = input.strip_prefix("/endpoint") {
            match client.set_endpoint(url.trim()) {
                Ok(()) => Output::success(&format!("Endpoint set to {}", client.endpoint())),
                Err(e) => Output::error(&e.to_string()),
            }
            continue;
        }

        if let Some(key) = input.strip_prefix("/key") {
            let key = key.trim();
            client.set_api_key((!key.is_empty()).then(|| key.to_string()));
            if client.has_api_key() {
                Output::success("API key set.");
            } else {
                Output::info("API key cleared.");
            }
            continue;
        }

        println!("\n{}", style("docchat:").cyan().bold());
        let mut live = LiveText::new();
        let typing = Output::spinner("Thinking...");

        let (next, result) = client
            .converse(transcript, input, |snapshot| {
                dismiss_when_started(&typing, &snapshot.text);
                render(&term, &mut live, &snapshot.text)
            })
            .await;
        typing.finish_and_clear();
        transcript = next;
        println!("\n");

        match result {
            Ok(answer) => report(&answer),
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    Ok(())
}

/// Clear the typing indicator once answer text starts arriving.
fn dismiss_when_started(typing: &ProgressBar, text: &str) {
    if !text.is_empty() && !typing.is_finished() {
        typing.finish_and_clear();
    }
}

/// Bring the terminal up to date with the latest answer text.
fn render(term: &Term, live: &mut LiveText, text: &str) {
    let previous_breaks = live.line_breaks();

    match live.update(text) {
        Some(Redraw::Append(added)) => {
            term.write_str(&added).ok();
        }
        Some(Redraw::Replace(all)) => {
            debug!("Redrawing answer ({} lines)", previous_breaks + 1);
            term.clear_line().ok();
            term.clear_last_lines(previous_breaks).ok();
            term.write_str(&all).ok();
        }
        None => {}
    }
}

fn report(answer: &Answer) {
    if let Some(error) = &answer.error {
        Output::warning(&format!("The service reported a problem: {}", error));
    } else if !answer.complete {
        Output::warning("The answer ended before it was complete.");
    }

    Output::sources(&answer.sources);
    if !answer.sources.is_empty() {
        println!();
    }
}
