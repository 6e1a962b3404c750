use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Fan-out shutdown signal for long-lived loops.
///
/// Every loop holds a [`ShutdownListener`]; triggering the coordinator (or
/// receiving SIGINT once signal handlers are installed) wakes all of them.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger shutdown on Ctrl-C
    pub fn install_signal_handlers(&self) -> JoinHandle<()> {
        let tx = Arc::clone(&self.tx);
        info!("Installing signal handlers for graceful shutdown");

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, shutting down");
                    tx.send_replace(true);
                }
                Err(e) => warn!(error = %e, "Failed to listen for interrupt signal"),
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once shutdown is triggered or the coordinator is gone
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_every_listener() {
        let coordinator = ShutdownCoordinator::new();
        let mut first = coordinator.listener();
        let mut second = coordinator.listener();

        coordinator.trigger();

        tokio::time::timeout(Duration::from_secs(1), first.wait()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), second.wait()).await.unwrap();
        assert!(coordinator.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_listeners() {
        let coordinator = ShutdownCoordinator::new();
        let mut listener = coordinator.listener();
        drop(coordinator);

        tokio::time::timeout(Duration::from_secs(1), listener.wait()).await.unwrap();
    }
}
