use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, HeaderName};
use axum::http::{HeaderMap, Method};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::model::ModelRequest;
use crate::model_gateway::ModelGateway;
use crate::server::AppState;
use crate::server::handlers::EMPTY_REPLY_NOTE;
use crate::server::request::{ApiError, decode_chat_request};
use crate::transcript;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RelayEvent {
    Start { model: String },
    Partial { part: String },
    Complete { reply: String, model: String },
    Error { error: String },
    Done,
}

impl RelayEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Partial { .. } => "partial",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    pub(crate) fn payload(&self) -> Value {
        match self {
            Self::Start { model } => json!({ "model": model }),
            Self::Partial { part } => json!({ "part": part }),
            Self::Complete { reply, model } if reply.is_empty() => {
                json!({ "reply": reply, "model": model, "note": EMPTY_REPLY_NOTE })
            }
            Self::Complete { reply, model } => json!({ "reply": reply, "model": model }),
            Self::Error { error } => json!({ "error": error }),
            Self::Done => json!({}),
        }
    }

    fn into_sse(self) -> Event {
        Event::default()
            .event(self.name())
            .data(self.payload().to_string())
    }
}

pub(crate) async fn chat_stream(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let request = decode_chat_request(&method, &headers, body, state.cfg.max_body_bytes).await?;
    let model = request.resolved_model(&state.cfg.model);
    let contents = transcript::contents_for_chat(&request, &state.cfg.system_prompt);
    info!(model = %model, turn_count = contents.len(), "handling streaming chat request");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(relay(
        state.gateway.clone(),
        ModelRequest { model, contents },
        tx,
    ));

    let events = UnboundedReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.into_sse()));
    let response_headers = [
        (CACHE_CONTROL, "no-cache, no-transform"),
        (X_ACCEL_BUFFERING, "no"),
    ];
    Ok((response_headers, Sse::new(events)).into_response())
}

/// Drives one upstream stream into `tx`. A failed send means the client went
/// away; the relay then stops reading upstream and sends nothing more.
pub(crate) async fn relay(
    gateway: Arc<dyn ModelGateway>,
    request: ModelRequest,
    tx: UnboundedSender<RelayEvent>,
) {
    let model = request.model.clone();
    if tx
        .send(RelayEvent::Start {
            model: model.clone(),
        })
        .is_err()
    {
        debug!(model = %model, "client disconnected before stream start");
        return;
    }

    let mut reply = String::new();
    let mut disconnected = false;
    let result = {
        let fragment_tx = tx.clone();
        let reply = &mut reply;
        let disconnected = &mut disconnected;
        gateway
            .stream(
                request,
                Box::new(move |fragment: &str| {
                    let event = RelayEvent::Partial {
                        part: fragment.to_string(),
                    };
                    if fragment_tx.send(event).is_err() {
                        *disconnected = true;
                        return ControlFlow::Break(());
                    }
                    reply.push_str(fragment);
                    ControlFlow::Continue(())
                }),
            )
            .await
    };

    match result {
        Ok(_) if disconnected => {
            info!(model = %model, relayed_len = reply.len(), "client disconnected mid-stream");
        }
        Ok(_) => {
            debug!(model = %model, reply_len = reply.len(), "stream complete");
            let _ = tx.send(RelayEvent::Complete { reply, model });
            let _ = tx.send(RelayEvent::Done);
        }
        Err(err) => {
            let error = format!("model error: {err:#}");
            warn!(model = %model, error = %error, "streaming upstream call failed");
            let _ = tx.send(RelayEvent::Error { error });
            let _ = tx.send(RelayEvent::Done);
        }
    }
}
