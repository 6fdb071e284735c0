use async_trait::async_trait;
use tokio::sync::watch;

/// Host-provided connectivity signal. The queue subscribes at startup and
/// flushes when the receiver flips from offline to online.
#[async_trait]
pub trait ConnectivityMonitor: Send + Sync {
    async fn is_online(&self) -> bool;
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Monitor for hosts without a connectivity signal; always reports online.
pub struct AlwaysOnline {
    sender: watch::Sender<bool>,
}

impl AlwaysOnline {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(true);
        Self { sender }
    }
}

impl Default for AlwaysOnline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectivityMonitor for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
