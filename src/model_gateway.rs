use anyhow::Result;
use reqwest::Client;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Config;
use crate::model::{ModelReply, ModelRequest};
use crate::providers::gemini;

pub type ModelGatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<ModelReply>> + Send + 'a>>;

/// Receives streamed text fragments; returning `Break` stops the stream.
pub type FragmentSink<'a> = Box<dyn FnMut(&str) -> ControlFlow<()> + Send + 'a>;

pub trait ModelGateway: Send + Sync {
    fn generate<'a>(&'a self, request: ModelRequest) -> ModelGatewayFuture<'a>;

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
        on_fragment: FragmentSink<'a>,
    ) -> ModelGatewayFuture<'a>;
}

/// Gateway backed by the Gemini Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiGateway {
    client: Client,
    cfg: Arc<Config>,
}

impl GeminiGateway {
    pub fn new(client: Client, cfg: Arc<Config>) -> Self {
        Self { client, cfg }
    }
}

impl ModelGateway for GeminiGateway {
    fn generate<'a>(&'a self, request: ModelRequest) -> ModelGatewayFuture<'a> {
        Box::pin(async move { gemini::generate(&self.client, &self.cfg, &request).await })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
        on_fragment: FragmentSink<'a>,
    ) -> ModelGatewayFuture<'a> {
        Box::pin(async move { gemini::stream(&self.client, &self.cfg, &request, on_fragment).await })
    }
}


#[cfg(test)]
mod tests {
    use std::ops::ControlFlow;

    use super::ModelGateway;
    use super::testing::StubGateway;
    use crate::model::{ModelRequest, Turn};

    fn request() -> ModelRequest {
        ModelRequest {
            model: "gemini-2.5-flash".to_string(),
            contents: vec![Turn::user("seed"), Turn::user("hi")],
        }
    }

    #[tokio::test]
    async fn stub_stream_stops_when_sink_breaks() {
        let gateway = StubGateway::ok(["a", "b", "c"]);
        let mut seen = Vec::new();
        let reply = gateway
            .stream(
                request(),
                Box::new(|fragment: &str| {
                    seen.push(fragment.to_string());
                    if seen.len() == 2 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }),
            )
            .await
            .expect("stream should succeed");

        assert_eq!(reply.text, "ab");
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn stub_records_requests_and_preserves_errors() {
        let gateway = StubGateway::err("backend failure");
        let err = gateway
            .generate(request())
            .await
            .expect_err("generate should fail");

        assert!(format!("{err:#}").contains("backend failure"));
        let calls = gateway.recorded();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].contents[1].text, "hi");
    }
}
