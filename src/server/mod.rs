mod handlers;
mod relay;
pub mod request;

pub use handlers::{ChatResponse, PromptResponse};

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::any;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::model_gateway::ModelGateway;
use crate::shutdown::Shutdown;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn ModelGateway>,
    pub cfg: Arc<Config>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn ModelGateway>, cfg: Arc<Config>) -> Self {
        Self { gateway, cfg }
    }
}

/// Every route accepts any method so that a wrong method gets the same JSON
/// error body as every other rejection.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handlers::hello))
        .route("/llm/chat", any(handlers::chat))
        .route("/llm/chat/partial", any(relay::chat_stream))
        .route("/llm/prompts", any(handlers::prompts))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let shutdown = Shutdown::install();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {addr} (check SERVER_ADDR)"))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read bound server address")?;
    info!(
        addr = %local_addr,
        model = %state.cfg.model,
        "http server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.wait().await;
            info!("starting graceful shutdown");
        })
        .await
        .context("HTTP server terminated unexpectedly")?;

    info!("http server stopped");
    Ok(())
}
