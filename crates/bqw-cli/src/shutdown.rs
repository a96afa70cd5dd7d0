//! Ctrl-C / SIGTERM handling for long-running commands

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Cancels a token when the process receives SIGINT or SIGTERM.
///
/// In-flight warehouse calls are left to finish; only new work stops.
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    log::warn!("Failed to install SIGINT handler: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        log::warn!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => log::info!("Received SIGINT, finishing in-flight calls"),
                _ = terminate => log::info!("Received SIGTERM, finishing in-flight calls"),
            }
            eprintln!("\nInterrupted: waiting for in-flight operations, no new ones will start");

            cancel_token.cancel();
        });
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}
