//! Progressive JSON envelope.
//!
//! Body layout, with Python-style `", "` / `": "` separators:
//!
//! ```text
//! {"query": "<query>", "response": "<escaped tokens...>", "sources": ["<url>", ...]}
//! ```

use super::{dedup_sources, quote, unescape, utf8_prefix, EnvelopeDecoder, Snapshot};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Text that separates the answer from the source list in the envelope.
pub const SOURCES_SENTINEL: &str = "\", \"sources\"";

/// The envelope as a whole, once complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyEnvelope {
    pub query: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Opening fragment: the echoed query and the start of the response string.
pub(super) fn open(query: &str) -> String {
    format!("{{\"query\": {}, \"response\": \"", quote(query))
}

/// Closing fragment: end of the response string, the sources and the final brace.
pub(super) fn close(sources: &[String]) -> String {
    let list = sources
        .iter()
        .map(|source| quote(source))
        .collect::<Vec<_>>()
        .join(", ");
    format!("\", \"sources\": [{}]}}", list)
}

/// Decoder for the progressive envelope.
///
/// A strict parse is attempted whenever the buffer ends in `}`; until one
/// succeeds the answer is recovered from the text after `"response": "`,
/// cut at the last [`SOURCES_SENTINEL`].
pub struct LegacyDecoder {
    buffer: Vec<u8>,
    response_field: Regex,
    snapshot: Snapshot,
}

impl LegacyDecoder {
    pub fn new() -> Self {
        let response_field = Regex::new(r#"(?s)"response":\s*"(.*)"#).expect("Invalid regex");

        Self {
            buffer: Vec::new(),
            response_field,
            snapshot: Snapshot::default(),
        }
    }

    /// Answer text recovered from an incomplete buffer.
    pub fn partial_text(&self, buffer: &str) -> Option<String> {
        let captures = self.response_field.captures(buffer)?;
        let mut text = unescape(captures.get(1)?.as_str());
        if let Some(end) = text.rfind(SOURCES_SENTINEL) {
            text.truncate(end);
        }
        Some(text)
    }

    fn try_complete(buffer: &str) -> Option<LegacyEnvelope> {
        if !buffer.ends_with('}') {
            return None;
        }
        serde_json::from_str(buffer).ok()
    }
}

impl Default for LegacyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeDecoder for LegacyDecoder {
    fn push(&mut self, chunk: &[u8]) -> &Snapshot {
        self.buffer.extend_from_slice(chunk);

        if self.snapshot.complete {
            return &self.snapshot;
        }

        let buffer = utf8_prefix(&self.buffer);

        if let Some(envelope) = Self::try_complete(buffer) {
            self.snapshot.text = envelope.response;
            self.snapshot.sources = dedup_sources(envelope.sources);
            self.snapshot.complete = true;
        } else if let Some(text) = self.partial_text(buffer) {
            self.snapshot.text = text;
        }

        &self.snapshot
    }

    fn finish(&mut self) -> &Snapshot {
        &self.snapshot
    }

    fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::escape;

    fn body(query: &str, tokens: &[&str], sources: &[&str]) -> String {
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        let mut body = open(query);
        for token in tokens {
            body.push_str(&escape(token));
        }
        body.push_str(&close(&sources));
        body
    }

    #[test]
    fn test_fragments_match_envelope_layout() {
        assert_eq!(open("hi"), "{\"query\": \"hi\", \"response\": \"");
        assert_eq!(
            close(&["https://a".to_string(), "https://b".to_string()]),
            "\", \"sources\": [\"https://a\", \"https://b\"]}"
        );
        assert_eq!(close(&[]), "\", \"sources\": []}");
    }

    #[test]
    fn test_complete_body_parses_with_exact_keys() {
        let query = "Quote \" and newline \n and unicode ✓";
        let text = body(query, &["Hello", " \"world\"", "\n"], &["https://x"]);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["query", "response", "sources"]);
        assert_eq!(object["query"].as_str().unwrap(), query);
        assert_eq!(object["response"].as_str().unwrap(), "Hello \"world\"\n");
    }

    #[test]
    fn test_partial_without_sentinel_is_not_truncated() {
        let decoder = LegacyDecoder::new();
        let buffer = "{\"query\": \"q\", \"response\": \"Line one\\nHe said \\\"sources\\\", ok";
        assert_eq!(
            decoder.partial_text(buffer).unwrap(),
            "Line one\nHe said \"sources\", ok"
        );
    }

    #[test]
    fn test_partial_truncates_at_sentinel() {
        let decoder = LegacyDecoder::new();
        let buffer = "{\"query\": \"q\", \"response\": \"Answer\", \"sources\": [\"https://a";
        assert_eq!(decoder.partial_text(buffer).unwrap(), "Answer");
    }

    #[test]
    fn test_partial_before_response_field() {
        let decoder = LegacyDecoder::new();
        assert_eq!(decoder.partial_text("{\"query\": \"q\""), None);
    }

    #[test]
    fn test_decoder_progression() {
        let mut decoder = LegacyDecoder::new();

        let snap = decoder.push(b"{\"query\": \"q\", \"response\": \"Hel");
        assert_eq!(snap.text, "Hel");
        assert!(!snap.complete);

        let snap = decoder.push(b"lo \\\"you\\\"");
        assert_eq!(snap.text, "Hello \"you\"");

        let snap = decoder.push(b"\", \"sources\": [\"https://a\", \"https://a\"]}");
        assert!(snap.complete);
        assert_eq!(snap.text, "Hello \"you\"");
        assert_eq!(snap.sources, vec!["https://a"]);

        // Bytes after completion are ignored
        let snap = decoder.push(b"garbage");
        assert!(snap.complete);
        assert_eq!(decoder.finish().text, "Hello \"you\"");
    }

    #[test]
    fn test_truncated_body_never_completes() {
        let mut decoder = LegacyDecoder::new();
        decoder.push(b"{\"query\": \"q\", \"response\": \"Partial answ");
        let snap = decoder.finish();
        assert!(!snap.complete);
        assert_eq!(snap.text, "Partial answ");
        assert!(snap.sources.is_empty());
        assert!(snap.error.is_none());
    }

    #[test]
    fn test_brace_inside_answer_does_not_complete() {
        let mut decoder = LegacyDecoder::new();
        let snap = decoder.push(b"{\"query\": \"q\", \"response\": \"a map {k: v}");
        assert!(!snap.complete);
        assert_eq!(snap.text, "a map {k: v}");
    }

    #[test]
    fn test_any_chunking_gives_same_result() {
        let text = body(
            "What services does i2e offer?",
            &["We offer ", "\"consulting\"", "\nand ✓ more"],
            &["https://i2e.com/services"],
        );
        let bytes = text.as_bytes();

        for size in 1..=9 {
            let mut decoder = LegacyDecoder::new();
            for chunk in bytes.chunks(size) {
                decoder.push(chunk);
            }
            let snap = decoder.finish();
            assert!(snap.complete, "chunk size {}", size);
            assert_eq!(snap.text, "We offer \"consulting\"\nand ✓ more");
            assert_eq!(snap.sources, vec!["https://i2e.com/services"]);
        }
    }
}
