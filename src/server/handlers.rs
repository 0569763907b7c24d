use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::ALLOW;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::model::ModelRequest;
use crate::server::AppState;
use crate::server::request::{ApiError, decode_chat_request};
use crate::suggest;
use crate::transcript;

pub(crate) const EMPTY_REPLY_NOTE: &str = "empty model reply (blocked or no text parts)";

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompts: Vec<String>,
    pub model: String,
}

pub(crate) async fn hello(method: Method) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET")]).into_response();
    }
    Json(json!({ "message": "Hello, world!" })).into_response()
}

pub(crate) async fn chat(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = decode_chat_request(&method, &headers, body, state.cfg.max_body_bytes).await?;
    let model = request.resolved_model(&state.cfg.model);
    let contents = transcript::contents_for_chat(&request, &state.cfg.system_prompt);
    info!(model = %model, turn_count = contents.len(), "handling chat request");

    let reply = state
        .gateway
        .generate(ModelRequest {
            model: model.clone(),
            contents,
        })
        .await
        .map_err(|err| {
            warn!(model = %model, error = %format!("{err:#}"), "chat upstream call failed");
            ApiError::upstream(&err)
        })?;

    let text = reply.text.trim();
    if text.is_empty() {
        return Ok(Json(ChatResponse {
            reply: String::new(),
            model,
            note: Some(EMPTY_REPLY_NOTE),
            ts: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        }));
    }

    Ok(Json(ChatResponse {
        reply: text.to_string(),
        model,
        note: None,
        ts: None,
    }))
}

pub(crate) async fn prompts(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<PromptResponse>, ApiError> {
    let request = decode_chat_request(&method, &headers, body, state.cfg.max_body_bytes).await?;
    let model = request.resolved_model(&state.cfg.model);
    let contents = transcript::contents_for_prompts(&request, &state.cfg.system_prompt);
    info!(model = %model, turn_count = contents.len(), "handling prompt suggestion request");

    let reply = state
        .gateway
        .generate(ModelRequest {
            model: model.clone(),
            contents,
        })
        .await
        .map_err(|err| {
            warn!(model = %model, error = %format!("{err:#}"), "prompt upstream call failed");
            ApiError::upstream(&err)
        })?;

    Ok(Json(PromptResponse {
        prompts: suggest::parse_suggestions(&reply.text),
        model,
    }))
}
