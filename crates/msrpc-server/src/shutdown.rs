use tokio::sync::broadcast;

/// Broadcasts a stop signal to the accept loop.
///
/// Cloning yields another handle to the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signals every subscriber. Signalling twice is harmless.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
