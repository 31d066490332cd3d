//! Newline-delimited JSON event framing.

use super::{dedup_sources, EnvelopeDecoder, Snapshot};
use crate::error::{DocchatError, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One line of the event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Echo of the query; always the first event.
    Start { query: String },
    /// A fragment of answer text.
    Token { text: String },
    /// End of answer with the resolved sources.
    Done { sources: Vec<String> },
    /// Generation failed after streaming started.
    Error { message: String },
}

impl StreamEvent {
    /// Serialize as one newline-terminated line.
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line, without its newline.
    pub fn decode(line: &[u8]) -> Result<Self> {
        serde_json::from_slice(line)
            .map_err(|e| DocchatError::Protocol(format!("Malformed event: {}", e)))
    }
}

/// Decoder for the event stream.
pub struct FramedDecoder {
    pending: Vec<u8>,
    snapshot: Snapshot,
}

impl FramedDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            snapshot: Snapshot::default(),
        }
    }

    fn apply_line(&mut self, line: &[u8]) {
        let line = trim_ascii(line);
        if line.is_empty() || self.snapshot.complete {
            return;
        }

        match StreamEvent::decode(line) {
            Ok(StreamEvent::Start { .. }) => {}
            Ok(StreamEvent::Token { text }) => self.snapshot.text.push_str(&text),
            Ok(StreamEvent::Done { sources }) => {
                self.snapshot.sources = dedup_sources(sources);
                self.snapshot.complete = true;
            }
            Ok(StreamEvent::Error { message }) => self.snapshot.error = Some(message),
            Err(e) => {
                warn!("Skipping event line: {}", e);
                self.snapshot.error = Some(e.to_string());
            }
        }
    }
}

impl Default for FramedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeDecoder for FramedDecoder {
    fn push(&mut self, chunk: &[u8]) -> &Snapshot {
        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.apply_line(&line);
        }

        &self.snapshot
    }

    fn finish(&mut self) -> &Snapshot {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.apply_line(&line);
        }
        &self.snapshot
    }

    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
