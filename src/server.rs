//! HTTP chat service.
//!
//! `POST /chat` (also mounted at `/api/chat/`) answers a `{"query": ...}`
//! body with a streamed answer in the framing chosen by the `Accept` header.
//! Failures before streaming starts are answered with a JSON
//! `{"detail": ...}` body instead.

use crate::error::DocchatError;
use crate::protocol::WireFormat;
use crate::rag::{AnswerStream, RagEngine};
use async_stream::try_stream;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "api-key";

/// State shared by all requests. Built once at startup and never mutated.
pub struct AppContext {
    pub engine: RagEngine,
    pub api_key: Option<String>,
}

impl AppContext {
    pub fn new(engine: RagEngine, api_key: Option<String>) -> Self {
        Self {
            engine,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }
}

// === Request/Response Types ===

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Build the service router.
pub fn build_router(context: Arc<AppContext>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/api/chat/", post(chat))
        .layer(cors_layer(cors_origins))
        .with_state(context)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    if let Some(expected) = &context.api_key {
        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return error_response(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
        }
    }

    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };

    let format = WireFormat::from_accept(
        headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()),
    );

    let answer = match context.engine.answer(&request.query).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("Failed to prepare answer: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    info!(
        "Streaming answer with {} sources ({:?} framing)",
        answer.sources.len(),
        format
    );

    (
        [(header::CONTENT_TYPE, format.content_type())],
        Body::from_stream(answer_body(format, answer)),
    )
        .into_response()
}

/// Response body: opening fragment, one fragment per token, closing fragment.
///
/// A token stream failure ends the body early. The legacy envelope is left
/// unclosed; the event framing reports it with an `error` event.
fn answer_body(
    format: WireFormat,
    answer: AnswerStream,
) -> impl Stream<Item = Result<String, DocchatError>> + Send {
    let AnswerStream {
        query,
        sources,
        mut tokens,
    } = answer;

    try_stream! {
        yield format.open(&query)?;

        let mut failed = false;
        while let Some(token) = tokens.next().await {
            match token {
                Ok(text) => {
                    yield format.token(&text)?;
                }
                Err(e) => {
                    error!("Answer stream failed mid-response: {}", e);
                    if let Some(fragment) = format.failure(&e.to_string())? {
                        yield fragment;
                    }
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            yield format.close(&sources)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::protocol::{EnvelopeDecoder, FramedDecoder, LegacyDecoder, StreamEvent};
    use crate::sources::UrlMapping;
    use crate::testing::{passage, FailingEmbedder, LetterEmbedder, ScriptedModel};
    use crate::vector_store::{MemoryVectorStore, Passage};
    use axum::http::Request;
    use std::collections::{BTreeSet, HashMap};
    use tower::ServiceExt;

    const QUERY: &str = "What services does i2e offer?";

    fn i2e_passages() -> Vec<Passage> {
        vec![
            passage("corpus/a.pdf", "i2e offers consulting services"),
            passage("corpus/b.pdf", "services: analytics and automation"),
        ]
    }

    fn router_with(
        passages: Vec<Passage>,
        embedder: Arc<dyn Embedder>,
        model: ScriptedModel,
        api_key: Option<&str>,
    ) -> Router {
        let mapping = UrlMapping::new(HashMap::from([
            ("a.pdf".to_string(), "https://i2e.com/services".to_string()),
            ("b.pdf".to_string(), "https://i2e.com/services".to_string()),
        ]));
        let engine = RagEngine::new(
            Arc::new(MemoryVectorStore::with_passages(passages)),
            embedder,
            Arc::new(model),
            Arc::new(mapping),
        );
        let context = AppContext::new(engine, api_key.map(str::to_string));
        build_router(Arc::new(context), &["http://localhost:3000".to_string()])
    }

    fn router(model: ScriptedModel) -> Router {
        router_with(i2e_passages(), Arc::new(LetterEmbedder), model, None)
    }

    fn chat_request(body: &str, accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn query_body(query: &str) -> String {
        serde_json::to_string(&ChatRequest {
            query: query.to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_legacy_body_round_trips() {
        let model = ScriptedModel::new(&["We offer ", "\"consulting\"", "\nand analytics."]);
        let (status, content_type, body) =
            send(router(model), chat_request(&query_body(QUERY), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["query"], QUERY);
        assert_eq!(object["response"], "We offer \"consulting\"\nand analytics.");
        assert_eq!(object["sources"], serde_json::json!(["https://i2e.com/services"]));
    }

    #[tokio::test]
    async fn test_legacy_body_decodes_at_any_chunking() {
        let model = ScriptedModel::new(&["Consulting", " and \"data\" services"]);
        let (_, _, body) = send(router(model), chat_request(&query_body(QUERY), None)).await;

        for size in [1, 2, 5, 13, body.len()] {
            let mut decoder = LegacyDecoder::new();
            for chunk in body.as_bytes().chunks(size) {
                decoder.push(chunk);
            }
            let snap = decoder.finish();
            assert!(snap.complete);
            assert_eq!(snap.text, "Consulting and \"data\" services");
            assert_eq!(snap.sources, vec!["https://i2e.com/services"]);
        }
    }

    #[tokio::test]
    async fn test_query_echoed_byte_identical() {
        let query = "Quote \" backslash \\ tab \t and ✓";
        let (_, _, body) = send(
            router(ScriptedModel::new(&["ok"])),
            chat_request(&query_body(query), None),
        )
        .await;

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["query"].as_str().unwrap(), query);
    }

    #[tokio::test]
    async fn test_events_framing() {
        let model = ScriptedModel::new(&["Hello", " world"]);
        let (status, content_type, body) = send(
            router(model),
            chat_request(&query_body(QUERY), Some("application/x-ndjson")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/x-ndjson"));

        let events: Vec<StreamEvent> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Start {
                    query: QUERY.to_string()
                },
                StreamEvent::Token {
                    text: "Hello".to_string()
                },
                StreamEvent::Token {
                    text: " world".to_string()
                },
                StreamEvent::Done {
                    sources: vec!["https://i2e.com/services".to_string()]
                },
            ]
        );

        let mut decoder = FramedDecoder::new();
        decoder.push(body.as_bytes());
        assert_eq!(decoder.finish().text, "Hello world");
    }

    #[tokio::test]
    async fn test_sources_match_mapped_passages() {
        let passages = vec![
            passage("x/a.pdf", "alpha"),
            passage("x/b.pdf", "beta"),
            passage("x/c.pdf", "gamma"),
            passage("x/a.pdf", "delta"),
        ];
        let router = router_with(passages, Arc::new(LetterEmbedder), ScriptedModel::new(&[]), None);
        let (_, _, body) = send(router, chat_request(&query_body("q"), None)).await;

        let envelope: crate::protocol::LegacyEnvelope = serde_json::from_str(&body).unwrap();
        let sources: BTreeSet<String> = envelope.sources.into_iter().collect();
        assert_eq!(sources, BTreeSet::from(["https://i2e.com/services".to_string()]));
        assert_eq!(envelope.response, "");
    }

    #[tokio::test]
    async fn test_no_passages_gives_no_sources() {
        let router = router_with(Vec::new(), Arc::new(LetterEmbedder), ScriptedModel::new(&["Sorry"]), None);
        let (status, _, body) = send(router, chat_request(&query_body("q"), None)).await;

        assert_eq!(status, StatusCode::OK);
        let envelope: crate::protocol::LegacyEnvelope = serde_json::from_str(&body).unwrap();
        assert!(envelope.sources.is_empty());
        assert_eq!(envelope.response, "Sorry");
    }

    #[tokio::test]
    async fn test_retrieval_failure_is_500_detail() {
        let router = router_with(
            i2e_passages(),
            Arc::new(FailingEmbedder),
            ScriptedModel::new(&["never"]),
            None,
        );
        let (status, content_type, body) =
            send(router, chat_request(&query_body(QUERY), None)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        let error: ErrorResponse = serde_json::from_str(&body).unwrap();
        assert!(error.detail.contains("embedding service unavailable"));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_legacy_truncates() {
        let model = ScriptedModel::new(&["Partial", " answer", " lost"]).failing_after(2);
        let (status, _, body) = send(router(model), chat_request(&query_body(QUERY), None)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(serde_json::from_str::<serde_json::Value>(&body).is_err());
        assert!(!body.contains("\"sources\""));

        let mut decoder = LegacyDecoder::new();
        decoder.push(body.as_bytes());
        let snap = decoder.finish();
        assert!(!snap.complete);
        assert_eq!(snap.text, "Partial answer");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_events_reports_error() {
        let model = ScriptedModel::new(&["Partial", " answer"]).failing_after(1);
        let (_, _, body) = send(
            router(model),
            chat_request(&query_body(QUERY), Some("application/x-ndjson")),
        )
        .await;

        let last: StreamEvent = serde_json::from_str(body.lines().last().unwrap()).unwrap();
        assert!(matches!(last, StreamEvent::Error { .. }));

        let mut decoder = FramedDecoder::new();
        decoder.push(body.as_bytes());
        let snap = decoder.finish();
        assert!(!snap.complete);
        assert_eq!(snap.text, "Partial");
        assert!(snap.error.is_some());
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let make = || {
            router_with(
                i2e_passages(),
                Arc::new(LetterEmbedder),
                ScriptedModel::new(&["ok"]),
                Some("secret"),
            )
        };

        let (status, _, body) = send(make(), chat_request(&query_body(QUERY), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid or missing API key"));

        let mut request = chat_request(&query_body(QUERY), None);
        request
            .headers_mut()
            .insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        let (status, _, _) = send(make(), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_route_alias_and_bad_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"question\": \"wrong field\"}"))
            .unwrap();
        let (status, _, body) = send(router(ScriptedModel::new(&[])), request).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error: ErrorResponse = serde_json::from_str(&body).unwrap();
        assert!(!error.detail.is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, _, body) = send(router(ScriptedModel::new(&[])), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{\"status\":\"ok\"}");
    }
}
