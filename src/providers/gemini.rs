use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{ModelReply, ModelRequest, Turn};
use crate::providers::http_errors::{CallSite, model_api_request_error, model_stream_read_error};
use crate::providers::sse;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl Candidate {
    fn texts(&self) -> impl Iterator<Item = &str> {
        self.content
            .iter()
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .filter(|text| !text.is_empty())
    }
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .map(|candidate| candidate.texts().collect())
            .unwrap_or_default()
    }

    /// Every text fragment across all candidates, in order.
    fn fragments(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().flat_map(Candidate::texts)
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.finish_reason.as_deref())
    }
}

fn endpoint_url(base_url: &str, model: &str, method: &str) -> String {
    format!("{}/models/{}:{}", base_url.trim_end_matches('/'), model, method)
}

fn generate_url(base_url: &str, model: &str) -> String {
    endpoint_url(base_url, model, "generateContent")
}

fn stream_url(base_url: &str, model: &str) -> String {
    format!(
        "{}?alt=sse",
        endpoint_url(base_url, model, "streamGenerateContent")
    )
}

fn to_gemini_contents(turns: &[Turn]) -> Vec<Content<'_>> {
    turns
        .iter()
        .map(|turn| Content {
            role: turn.role.as_str(),
            parts: [Part { text: &turn.text }],
        })
        .collect()
}

/// Pulls the human-readable message out of a Gemini error body, falling back
/// to the raw body.
fn upstream_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => match envelope.error.status {
            Some(status) => format!("{} ({})", envelope.error.message, status),
            None => envelope.error.message,
        },
        _ => body.trim().to_string(),
    }
}

async fn send(
    client: &Client,
    cfg: &Config,
    site: CallSite<'_>,
    request: &ModelRequest,
) -> Result<reqwest::Response> {
    let api_key = cfg.require_api_key()?;
    let api_url = site.api_url;
    let body = GenerateContentRequest {
        contents: to_gemini_contents(&request.contents),
    };

    let response = client
        .post(api_url)
        .header(API_KEY_HEADER, api_key)
        .timeout(Duration::from_secs(site.timeout_secs))
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %request.model,
                error = %err,
                "gemini request failed"
            );
            model_api_request_error(err, site)
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model = %request.model,
            status = %status,
            response_body_len = response_body.len(),
            "gemini returned non-success status"
        );
        return Err(anyhow!(
            "Model request failed with status {}: {}",
            status,
            upstream_error_message(&response_body)
        ));
    }

    Ok(response)
}

pub async fn generate(client: &Client, cfg: &Config, request: &ModelRequest) -> Result<ModelReply> {
    let api_url = generate_url(&cfg.model_base_url, &request.model);
    debug!(
        api_url = %api_url,
        model = %request.model,
        turn_count = request.contents.len(),
        "sending gemini generate request"
    );

    let site = CallSite {
        api_url: &api_url,
        timeout_secs: cfg.model_timeout_secs,
        timeout_var: "MODEL_TIMEOUT_SECS",
    };
    let response = send(client, cfg, site, request).await?;

    let parsed: GenerateContentResponse = response
        .json()
        .await
        .context("Failed to parse model generate response")?;
    let text = parsed.text();
    if text.is_empty() {
        warn!(
            model = %request.model,
            block_reason = parsed.block_reason().unwrap_or("none"),
            finish_reason = parsed.finish_reason().unwrap_or("none"),
            "gemini returned no text"
        );
    }
    debug!(
        model = %request.model,
        response_len = text.len(),
        "received gemini generate response"
    );
    Ok(ModelReply { text })
}

/// Streams a reply, handing each text fragment to `on_fragment` as it
/// arrives. Returns the concatenation of every fragment delivered.
pub async fn stream(
    client: &Client,
    cfg: &Config,
    request: &ModelRequest,
    mut on_fragment: impl FnMut(&str) -> ControlFlow<()>,
) -> Result<ModelReply> {
    let api_url = stream_url(&cfg.model_base_url, &request.model);
    debug!(
        api_url = %api_url,
        model = %request.model,
        turn_count = request.contents.len(),
        "sending gemini stream request"
    );

    let site = CallSite {
        api_url: &api_url,
        timeout_secs: cfg.stream_timeout_secs,
        timeout_var: "STREAM_TIMEOUT_SECS",
    };
    let response = send(client, cfg, site, request).await?;

    let mut text = String::new();
    let mut chunk_count = 0usize;
    sse::read_events(response, |event| {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&event.data) {
            return Err(anyhow!(
                "Model stream reported an error: {}",
                envelope.error.message
            ));
        }
        let chunk: GenerateContentResponse = serde_json::from_str(&event.data)
            .context("Failed to parse model stream chunk")?;
        chunk_count += 1;

        for fragment in chunk.fragments() {
            text.push_str(fragment);
            if on_fragment(fragment).is_break() {
                debug!(model = %request.model, "stream consumer stopped early");
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    })
    .await
    .map_err(|err| model_stream_read_error(err, site))?;

    debug!(
        model = %request.model,
        chunk_count,
        response_len = text.len(),
        "finished gemini stream"
    );
    Ok(ModelReply { text })
}

#[cfg(test)]
mod tests {
    use super::{
        GenerateContentResponse, generate_url, stream_url, to_gemini_contents,
        upstream_error_message,
    };
    use crate::model::Turn;

    #[test]
    fn urls_trim_trailing_slash() {
        assert_eq!(
            generate_url("https://example.test/v1beta/", "gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            stream_url("https://example.test/v1beta", "gemini-2.5-flash"),
            "https://example.test/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn request_body_uses_gemini_roles() {
        let turns = vec![Turn::user("hi"), Turn::model("hello")];
        let body = serde_json::to_value(super::GenerateContentRequest {
            contents: to_gemini_contents(&turns),
        })
        .expect("body should serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "hello"}]}
                ]
            })
        );
    }

    #[test]
    fn text_concatenates_first_candidate_parts() {
        let parsed: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [
                {"content": {"parts": [{"text": "Om "}, {"text": "shanti"}]}, "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]}"#,
        )
        .expect("response should parse");
        assert_eq!(parsed.text(), "Om shanti");
        assert_eq!(parsed.finish_reason(), Some("STOP"));
        let fragments: Vec<&str> = parsed.fragments().collect();
        assert_eq!(fragments, vec!["Om ", "shanti", "ignored"]);
    }

    #[test]
    fn blocked_prompt_yields_empty_text() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
                .expect("response should parse");
        assert_eq!(parsed.text(), "");
        assert_eq!(parsed.block_reason(), Some("SAFETY"));
    }

    #[test]
    fn upstream_error_message_prefers_error_envelope() {
        assert_eq!(
            upstream_error_message(
                r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#
            ),
            "API key not valid (INVALID_ARGUMENT)"
        );
        assert_eq!(upstream_error_message(" bad gateway \n"), "bad gateway");
    }
}
