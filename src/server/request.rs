use axum::Json;
use axum::body::{Body, to_bytes};
use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Inbound payload shared by every chat-style route.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub model: Option<String>,
}

/// A prior turn as the client labels it. Accepts `user`, `assistant`,
/// `model`, `ai` or `system`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatRequest {
    pub fn history(&self) -> &[HistoryEntry] {
        self.history.as_deref().unwrap_or_default()
    }

    pub fn trimmed_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.trimmed_message().is_none() && self.history().is_empty()
    }

    pub fn resolved_model(&self, default_model: &str) -> String {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(default_model)
            .to_string()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("method not allowed")]
    MethodNotAllowed { allow: Method },
    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,
    #[error("{0}")]
    BadRequest(String),
    #[error("model error: {0}")]
    Upstream(String),
}

impl ApiError {
    pub fn upstream(err: &anyhow::Error) -> Self {
        Self::Upstream(format!("{err:#}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        let mut response = (status, body).into_response();
        if let Self::MethodNotAllowed { allow } = &self
            && let Ok(value) = HeaderValue::from_str(allow.as_str())
        {
            response.headers_mut().insert(ALLOW, value);
        }
        response
    }
}

/// True when the media type, ignoring parameters and case, is
/// `application/json`.
fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|media_type| media_type.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Model ids become a path segment of the upstream URL, so only the
/// characters Gemini model names use are accepted.
fn is_valid_model_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'))
}

/// Validates and parses a chat payload: method, then content type, then
/// body size, then JSON shape, then non-emptiness and the model override.
pub async fn decode_chat_request(
    method: &Method,
    headers: &HeaderMap,
    body: Body,
    max_body_bytes: usize,
) -> Result<ChatRequest, ApiError> {
    if method != Method::POST {
        return Err(ApiError::MethodNotAllowed {
            allow: Method::POST,
        });
    }

    if !is_json_content_type(headers) {
        return Err(ApiError::UnsupportedMediaType);
    }

    let bytes = to_bytes(body, max_body_bytes).await.map_err(|_| {
        ApiError::BadRequest(format!(
            "invalid JSON: request body unreadable or larger than {max_body_bytes} bytes"
        ))
    })?;

    let request: ChatRequest = serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::BadRequest(format!("invalid JSON: {err}")))?;

    if request.is_empty() {
        return Err(ApiError::BadRequest(
            "message required (or history/seed)".to_string(),
        ));
    }

    if let Some(model) = request.model.as_deref().map(str::trim)
        && !model.is_empty()
        && !is_valid_model_name(model)
    {
        return Err(ApiError::BadRequest(format!("invalid model name: {model:?}")));
    }
    Ok(request)
}
