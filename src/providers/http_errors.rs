use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

fn error_chain_has(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has(err, ErrorKind::TimedOut, "timed out")
}

/// Where a request was going and which knob bounds it, for error messages.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallSite<'a> {
    pub api_url: &'a str,
    pub timeout_secs: u64,
    pub timeout_var: &'a str,
}

fn timeout_error(site: CallSite<'_>) -> anyhow::Error {
    anyhow!(
        "Model request timed out after {}s while calling '{}'. \
         Increase {} or check model responsiveness.",
        site.timeout_secs,
        site.api_url,
        site.timeout_var
    )
}

pub(crate) fn model_api_request_error(err: reqwest::Error, site: CallSite<'_>) -> anyhow::Error {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return timeout_error(site);
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return anyhow!(
                "Connection refused by model API at '{}'. \
                 Ensure MODEL_BASE_URL points at a reachable Gemini endpoint.",
                site.api_url
            );
        }

        return anyhow!(
            "Failed to connect to model API at '{}'. \
             Check MODEL_BASE_URL and network connectivity.",
            site.api_url
        );
    }

    anyhow!("Failed to call model API at '{}': {}", site.api_url, err)
}

/// A response body that stalls past the request deadline fails mid-read
/// rather than at send time.
pub(crate) fn model_stream_read_error(err: anyhow::Error, site: CallSite<'_>) -> anyhow::Error {
    if error_chain_has_timeout(&*err) {
        return timeout_error(site);
    }
    err
}
