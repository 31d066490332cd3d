//! Chat HTTP service command.

use super::open_engine;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::server::{build_router, AppContext};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Run the chat HTTP service.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let engine = open_engine(&settings).await?;
    info!("Answering with model {}", engine.model_name());

    let context = Arc::new(AppContext::new(engine, settings.server.api_key.clone()));
    let app = build_router(context.clone(), &settings.server.cors_origins);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("docchat API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Chat", "POST /chat");
    Output::kv("Chat (alias)", "POST /api/chat/");
    if context.api_key.is_some() {
        Output::kv("Auth", "api-key header required");
    }
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}
