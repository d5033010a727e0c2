use tokio::sync::broadcast;

use crate::config::RelayerConfig;

/// The relayer context: the loaded configuration plus the shutdown signal
/// shared by every long-running task the embedding service starts.
#[derive(Debug, Clone)]
pub struct RelayerContext {
    /// The loaded configuration.
    pub config: RelayerConfig,
    notify_shutdown: broadcast::Sender<()>,
}

impl RelayerContext {
    /// A context over the given configuration.
    pub fn new(config: RelayerConfig) -> Self {
        let (notify_shutdown, _) = broadcast::channel(2);
        Self { config, notify_shutdown }
    }

    /// A receiver that resolves once shutdown has been requested.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.notify_shutdown.subscribe()
    }

    /// Requests a global shutdown. Coordinators in flight have no cancel
    /// signal; they finish through their own terminal conditions while the
    /// outer services stop accepting work.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }
}
