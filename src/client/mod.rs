//! Streaming chat client.
//!
//! Posts a question to the chat service and decodes the answer while it is
//! still arriving, reporting each improved [`Snapshot`] to a callback.

mod live;
mod transcript;

pub use live::{LiveText, Redraw};
pub use transcript::{ChatTurn, Role, Transcript};

use crate::config::ClientSettings;
use crate::error::{DocchatError, Result};
use crate::protocol::{EnvelopeDecoder, Snapshot, WireFormat};
use crate::server::{ChatRequest, ErrorResponse, API_KEY_HEADER};
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use tracing::{debug, instrument, warn};

/// Final state of one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Answer text; partial when `complete` is false.
    pub text: String,
    /// Source URLs, deduplicated.
    pub sources: Vec<String>,
    /// Whether the response body was fully and validly received.
    pub complete: bool,
    /// Failure reported by the server in the body.
    pub error: Option<String>,
}

impl From<Snapshot> for Answer {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            text: snapshot.text,
            sources: snapshot.sources,
            complete: snapshot.complete,
            error: snapshot.error,
        }
    }
}

/// HTTP client for the chat service.
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    format: WireFormat,
}

impl ChatClient {
    pub fn new(endpoint: &str, api_key: Option<String>, format: WireFormat) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: validate_endpoint(endpoint)?,
            api_key: api_key.filter(|k| !k.is_empty()),
            format,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(
            &settings.endpoint,
            settings.api_key.clone(),
            settings.protocol.into(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: &str) -> Result<()> {
        self.endpoint = validate_endpoint(endpoint)?;
        Ok(())
    }

    pub fn set_api_key(&mut self, api_key: Option<String>) {
        self.api_key = api_key.filter(|k| !k.is_empty());
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Ask a question, calling `on_update` whenever the decoded answer changes.
    ///
    /// Connection failures, error statuses and a body cut off by a transport
    /// error are returned as errors. A body that ends cleanly before it is
    /// complete is not: the returned answer carries the partial text with
    /// `complete` unset.
    #[instrument(skip(self, on_update), fields(endpoint = %self.endpoint))]
    pub async fn ask<F>(&self, query: &str, on_update: F) -> Result<Answer>
    where
        F: FnMut(&Snapshot),
    {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, self.format.content_type())
            .json(&ChatRequest {
                query: query.to_string(),
            });

        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocchatError::Api {
                status: status.as_u16(),
                detail: error_detail(&body, status.canonical_reason()),
            });
        }

        debug!("Response started with status {}", status);

        consume(response.bytes_stream(), self.format.decoder(), on_update).await
    }

    /// Run one turn of a conversation.
    ///
    /// The question is always added to the transcript. The answer is added
    /// when it has any text; failed requests add nothing further.
    pub async fn converse<F>(
        &self,
        transcript: Transcript,
        query: &str,
        on_update: F,
    ) -> (Transcript, Result<Answer>)
    where
        F: FnMut(&Snapshot),
    {
        let transcript = transcript.with_turn(ChatTurn::user(query));

        match self.ask(query, on_update).await {
            Ok(answer) if answer.text.is_empty() => (transcript, Ok(answer)),
            Ok(answer) => {
                let turn = ChatTurn::bot(answer.text.clone(), answer.sources.clone());
                (transcript.with_turn(turn), Ok(answer))
            }
            Err(e) => (transcript, Err(e)),
        }
    }
}

/// Feed a body stream through a decoder.
///
/// Chunk boundaries are irrelevant. `on_update` sees every snapshot that
/// differs from the previous one. A read error ends the answer with that error.
pub async fn consume<S, B, E, F>(
    stream: S,
    mut decoder: Box<dyn EnvelopeDecoder>,
    mut on_update: F,
) -> Result<Answer>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<DocchatError>,
    F: FnMut(&Snapshot),
{
    let mut stream = std::pin::pin!(stream);
    let mut last = Snapshot::default();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                let snapshot = decoder.push(bytes.as_ref());
                if *snapshot != last {
                    on_update(snapshot);
                    last = snapshot.clone();
                }
            }
            Err(e) => {
                let e: DocchatError = e.into();
                warn!(
                    "Response body interrupted after {} chars: {}",
                    decoder.snapshot().text.len(),
                    e
                );
                return Err(e);
            }
        }
    }

    let snapshot = decoder.finish();
    if *snapshot != last {
        on_update(snapshot);
    }

    Ok(Answer::from(snapshot.clone()))
}

fn validate_endpoint(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    let url = url::Url::parse(endpoint)
        .map_err(|e| DocchatError::InvalidInput(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(endpoint.to_string()),
        scheme => Err(DocchatError::InvalidInput(format!(
            "Unsupported endpoint scheme '{}'",
            scheme
        ))),
    }
}

/// `detail` of an error body, else the raw body, else the status reason.
fn error_detail(body: &str, reason: Option<&str>) -> String {
    if let Ok(error) = serde_json::from_str::<ErrorResponse>(body) {
        return error.detail;
    }
    let body = body.trim();
    if body.is_empty() {
        reason.unwrap_or("Request failed").to_string()
    } else {
        body.to_string()
    }
}
