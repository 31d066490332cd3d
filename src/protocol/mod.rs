//! Wire protocol between the chat service and its clients.
//!
//! Two framings are supported:
//!
//! - **Legacy envelope** (`application/json`): a single JSON object
//!   `{"query": ..., "response": "...", "sources": [...]}` written
//!   progressively. Token text is spliced into the still-open `response`
//!   string, so the body is only valid JSON once the final `}` arrives.
//!   Clients recover a partial answer with a pattern match.
//! - **Framed events** (`application/x-ndjson`): one JSON event per line
//!   (`start`, `token`, `done`, `error`). Every line parses on its own.
//!
//! Servers pick the framing from the request's `Accept` header; clients pick a
//! matching [`EnvelopeDecoder`].

mod events;
mod legacy;

pub use events::{FramedDecoder, StreamEvent};
pub use legacy::{LegacyDecoder, LegacyEnvelope, SOURCES_SENTINEL};

use crate::config::ClientProtocol;
use crate::error::Result;

/// Media type of the legacy envelope.
pub const LEGACY_CONTENT_TYPE: &str = "application/json";

/// Media type of the framed event stream.
pub const EVENTS_CONTENT_TYPE: &str = "application/x-ndjson";

/// Best answer decoded so far from a response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Answer text, possibly partial.
    pub text: String,
    /// Source URLs, deduplicated, in received order. Empty until final.
    pub sources: Vec<String>,
    /// Whether the body has been fully and validly received.
    pub complete: bool,
    /// Failure reported by the server or detected while decoding.
    pub error: Option<String>,
}

/// Incremental decoder for a streamed response body.
///
/// Chunk boundaries carry no meaning: the decoder must give the same final
/// snapshot however the body is split.
pub trait EnvelopeDecoder: Send {
    /// Feed the next chunk of body bytes.
    fn push(&mut self, chunk: &[u8]) -> &Snapshot;

    /// Signal end of body and return the final snapshot.
    fn finish(&mut self) -> &Snapshot;

    /// Current snapshot.
    fn snapshot(&self) -> &Snapshot;
}

/// Response framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Progressive JSON envelope.
    Legacy,
    /// Newline-delimited JSON events.
    Events,
}

impl WireFormat {
    /// Choose a framing from an `Accept` header value.
    ///
    /// Only an explicit request for `application/x-ndjson` selects events, so
    /// clients that predate the event framing keep receiving the envelope.
    pub fn from_accept(accept: Option<&str>) -> Self {
        let wants_events = accept.is_some_and(|value| {
            value
                .split(',')
                .filter_map(|part| part.split(';').next())
                .any(|media| media.trim().eq_ignore_ascii_case(EVENTS_CONTENT_TYPE))
        });

        if wants_events {
            WireFormat::Events
        } else {
            WireFormat::Legacy
        }
    }

    /// Content type of response bodies in this framing.
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Legacy => LEGACY_CONTENT_TYPE,
            WireFormat::Events => EVENTS_CONTENT_TYPE,
        }
    }

    /// Fragment written before any token.
    pub fn open(&self, query: &str) -> Result<String> {
        match self {
            WireFormat::Legacy => Ok(legacy::open(query)),
            WireFormat::Events => StreamEvent::Start {
                query: query.to_string(),
            }
            .encode(),
        }
    }

    /// Fragment carrying one token.
    pub fn token(&self, text: &str) -> Result<String> {
        match self {
            WireFormat::Legacy => Ok(escape(text)),
            WireFormat::Events => StreamEvent::Token {
                text: text.to_string(),
            }
            .encode(),
        }
    }

    /// Fragment written after the last token.
    pub fn close(&self, sources: &[String]) -> Result<String> {
        match self {
            WireFormat::Legacy => Ok(legacy::close(sources)),
            WireFormat::Events => StreamEvent::Done {
                sources: sources.to_vec(),
            }
            .encode(),
        }
    }

    /// Fragment reporting a mid-stream failure.
    ///
    /// The legacy envelope has no way to carry one; its body is left truncated.
    pub fn failure(&self, message: &str) -> Result<Option<String>> {
        match self {
            WireFormat::Legacy => Ok(None),
            WireFormat::Events => StreamEvent::Error {
                message: message.to_string(),
            }
            .encode()
            .map(Some),
        }
    }

    /// A fresh decoder for bodies in this framing.
    pub fn decoder(&self) -> Box<dyn EnvelopeDecoder> {
        match self {
            WireFormat::Legacy => Box::new(LegacyDecoder::new()),
            WireFormat::Events => Box::new(FramedDecoder::new()),
        }
    }
}

impl From<ClientProtocol> for WireFormat {
    fn from(protocol: ClientProtocol) -> Self {
        match protocol {
            ClientProtocol::Events => WireFormat::Events,
            ClientProtocol::Legacy => WireFormat::Legacy,
        }
    }
}

/// Escape text for inclusion inside a JSON string literal.
///
/// Quotes and newlines become `\"` and `\n`; backslashes and the remaining
/// control characters are escaped too, so the envelope parses for any token.
pub fn escape(text: &str) -> String {
    let quoted = quote(text);
    quoted[1..quoted.len() - 1].to_string()
}

/// Quote and escape text as a JSON string.
pub fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

/// Undo [`escape`] on the content of a possibly unfinished JSON string.
///
/// An escape sequence cut off by the end of input is dropped, since the rest
/// of it has not arrived yet. Unknown escapes are kept verbatim.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let bytes = raw.as_bytes();
    let mut i = 0;

    while let Some(offset) = raw[i..].find('\\') {
        let at = i + offset;
        out.push_str(&raw[i..at]);

        let Some(&kind) = bytes.get(at + 1) else {
            return out;
        };
        i = at + 2;

        match kind {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'b' => out.push('\u{08}'),
            b'f' => out.push('\u{0C}'),
            b'u' => {
                if raw.len() < i + 4 {
                    return out;
                }
                let Some(code) = hex4(raw, i) else {
                    out.push_str("\\u");
                    continue;
                };
                i += 4;

                if (0xD800..0xDC00).contains(&code) {
                    let rest = &raw[i..];
                    if rest.len() < 6 && (rest.is_empty() || rest.starts_with('\\')) {
                        return out;
                    }
                    match rest.strip_prefix("\\u").and_then(|_| hex4(raw, i + 2)) {
                        Some(low) if (0xDC00..0xE000).contains(&low) => {
                            let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                            out.push(char::from_u32(combined).unwrap_or('\u{FFFD}'));
                            i += 6;
                        }
                        _ => out.push('\u{FFFD}'),
                    }
                } else {
                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                }
            }
            _ => {
                // Keep the backslash; the next character is copied as-is.
                out.push('\\');
                i = at + 1;
            }
        }
    }

    out.push_str(&raw[i..]);
    out
}

fn hex4(raw: &str, at: usize) -> Option<u32> {
    let digits = raw.get(at..at + 4)?;
    if digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        u32::from_str_radix(digits, 16).ok()
    } else {
        None
    }
}

/// Remove duplicate URLs, keeping first occurrences in order.
pub fn dedup_sources(sources: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.clone()))
        .collect()
}

/// Longest valid UTF-8 prefix of a byte buffer.
///
/// A multi-byte character split across chunks stays out of view until its
/// remaining bytes arrive.
pub(crate) fn utf8_prefix(buffer: &[u8]) -> &str {
    match std::str::from_utf8(buffer) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&buffer[..e.valid_up_to()]).unwrap_or_default(),
    }
}
