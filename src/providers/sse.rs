use anyhow::{Context, Result, anyhow};
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{StreamExt, stream};
use std::convert::Infallible;
use std::ops::ControlFlow;

pub use eventsource_stream::Event;

/// Reads an SSE response body, handing each event to `on_event` until the
/// body ends or the callback breaks.
pub async fn read_events(
    response: reqwest::Response,
    mut on_event: impl FnMut(Event) -> Result<ControlFlow<()>>,
) -> Result<()> {
    let mut events = response.bytes_stream().eventsource();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(err)) => {
                return Err(err).context("Failed to read model event stream");
            }
            Err(err) => return Err(anyhow!("Malformed model event stream: {err}")),
        };
        if on_event(event)?.is_break() {
            return Ok(());
        }
    }
    Ok(())
}

/// Decodes a complete SSE document held in memory.
pub async fn parse_events(text: &str) -> Vec<Event> {
    stream::iter([Ok::<_, Infallible>(text.as_bytes().to_vec())])
        .eventsource()
        .filter_map(|event| async move { event.ok() })
        .collect()
        .await
}
