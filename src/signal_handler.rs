use tokio_util::sync::CancellationToken;

/// Graceful shutdown handler for the measurer server
#[derive(Clone, Default)]
pub struct GracefulShutdown {
    token: CancellationToken,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once shutdown has been requested, by signal or by [`Self::trigger`]
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("📨 Received SIGINT (Ctrl+C), performing graceful shutdown...");
            }
            _ = wait_for_sigterm() => {
                println!("📨 Received SIGTERM, performing graceful shutdown...");
            }
            _ = self.token.cancelled() => return,
        }
        self.trigger();
    }
}

/// Wait for SIGTERM signal (Unix only)
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
        sigterm.recv().await;
    } else {
        std::future::pending::<()>().await;
    }
}

/// For non-Unix systems, this will never trigger
#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_releases_waiters() {
        let shutdown = GracefulShutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_signal_wait_returns_after_manual_trigger() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait_for_signal())
            .await
            .unwrap();
    }
}
