use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
}

/// Process-level stop request: Ctrl+C, or SIGTERM on unix.
///
/// The SIGTERM listener is registered by [`Shutdown::install`], so a signal
/// that arrives before [`Shutdown::wait`] is first polled is not lost.
pub struct Shutdown {
    #[cfg(unix)]
    terminate: Option<signal::unix::Signal>,
}

impl Shutdown {
    pub fn install() -> Self {
        Self {
            #[cfg(unix)]
            terminate: install_terminate(),
        }
    }

    pub async fn wait(self) -> ShutdownReason {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                warn!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match self.terminate {
                Some(mut stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let reason = tokio::select! {
            _ = ctrl_c => ShutdownReason::Interrupt,
            _ = terminate => ShutdownReason::Terminate,
        };
        info!(?reason, "received shutdown signal");
        reason
    }
}

#[cfg(unix)]
fn install_terminate() -> Option<signal::unix::Signal> {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => Some(stream),
        Err(err) => {
            warn!(error = %err, "failed to install SIGTERM handler");
            None
        }
    }
}
