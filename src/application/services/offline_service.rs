use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::application::ports::ConnectivityMonitor;
use crate::domain::entities::PendingVote;
use crate::infrastructure::api::{ApiClient, VoteRequest};
use crate::infrastructure::database::CacheStore;
use crate::infrastructure::identity::IdentityService;
use crate::shared::config::QueueConfig;
use crate::shared::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlushOutcome {
    pub sent: u32,
    pub failed: u32,
}

/// Clears the flush flag on drop, including during unwinding, so a panicked
/// flush cannot leave the queue permanently locked.
struct FlushFlagGuard<'a>(&'a AtomicBool);

impl Drop for FlushFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Buffers votes that could not be sent and replays them when the network
/// returns. A vote is removed from the store only after the server accepted it,
/// so an interrupted flush never loses or duplicates a submission.
pub struct OfflineQueueService {
    store: Arc<CacheStore>,
    api: Arc<ApiClient>,
    identity: Arc<IdentityService>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: QueueConfig,
    user_agent: String,
    is_flushing: AtomicBool,
    flush_timer: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineQueueService {
    pub fn new(
        store: Arc<CacheStore>,
        api: Arc<ApiClient>,
        identity: Arc<IdentityService>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            api,
            identity,
            connectivity,
            config,
            user_agent: format!("RealTube/{}", env!("CARGO_PKG_VERSION")),
            is_flushing: AtomicBool::new(false),
            flush_timer: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Queue a vote for later submission, overwriting any earlier pending vote
    /// for the same video, and try flushing soon in case we are actually online.
    pub async fn enqueue(self: &Arc<Self>, video_id: &str, category: &str) -> Result<()> {
        let vote = PendingVote {
            video_id: video_id.to_string(),
            category: category.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.store.add_pending_vote(&vote).await?;
        tracing::info!("Vote queued offline for {}", video_id);

        self.schedule_flush(Duration::from_secs(self.config.initial_flush_delay_secs));
        Ok(())
    }

    /// Attempt to send every queued vote, oldest first. Single-flight: a flush
    /// started while another is running returns zero counts immediately.
    pub async fn flush(self: &Arc<Self>) -> Result<FlushOutcome> {
        if self
            .is_flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(FlushOutcome::default());
        }

        let _reset = FlushFlagGuard(&self.is_flushing);
        self.flush_locked().await
    }

    async fn flush_locked(self: &Arc<Self>) -> Result<FlushOutcome> {
        let pending = self.store.pending_votes().await?;
        if pending.is_empty() {
            return Ok(FlushOutcome::default());
        }
        tracing::info!("Flushing {} pending vote(s)", pending.len());

        let user_id = self.identity.public_user_id().await?;
        let now = Utc::now().timestamp_millis();
        let mut outcome = FlushOutcome::default();

        for vote in pending {
            if now - vote.timestamp > self.config.max_pending_age_ms {
                self.store.remove_pending_vote(&vote.video_id).await?;
                tracing::info!("Dropped expired pending vote for {}", vote.video_id);
                continue;
            }

            let request = VoteRequest {
                video_id: vote.video_id.clone(),
                category: vote.category.clone(),
                user_id: user_id.clone(),
                user_agent: self.user_agent.clone(),
            };
            match self.api.submit_vote(&request).await {
                Ok(_) => {
                    self.store.remove_pending_vote(&vote.video_id).await?;
                    outcome.sent += 1;
                    tracing::debug!("Flushed pending vote for {}", vote.video_id);
                }
                Err(err) => {
                    outcome.failed += 1;
                    tracing::error!("Failed to flush vote for {}: {}", vote.video_id, err);
                    // The outage most likely persists; leave the rest queued.
                    break;
                }
            }
        }

        if outcome.failed > 0 {
            self.schedule_flush(Duration::from_secs(self.config.flush_retry_secs));
        }

        Ok(outcome)
    }

    /// Arm (or re-arm) the single flush retry timer.
    fn schedule_flush(self: &Arc<Self>, delay: Duration) {
        let service = Arc::clone(self);
        let retry_delay = Duration::from_secs(self.config.flush_retry_secs);

        let mut guard = self.flush_timer.lock().expect("flush timer lock");
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if service.connectivity.is_online().await {
                if let Err(err) = service.flush().await {
                    tracing::error!("Scheduled flush failed: {}", err);
                }
            } else {
                service.schedule_flush(retry_delay);
            }
        }));
    }

    /// Subscribe to the connectivity signal and flush whenever it reports a
    /// return to online. Idempotent: re-starting replaces the listener.
    pub async fn start(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let mut receiver = self.connectivity.subscribe();

        let mut guard = self.listener.lock().expect("listener lock");
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        *guard = Some(tokio::spawn(async move {
            while receiver.changed().await.is_ok() {
                let online = *receiver.borrow_and_update();
                if online {
                    tracing::info!("Back online, flushing pending votes");
                    if let Err(err) = service.flush().await {
                        tracing::error!("Flush on reconnect failed: {}", err);
                    }
                }
            }
        }));
        drop(guard);

        // There may be votes left over from a previous session.
        if self.connectivity.is_online().await {
            self.schedule_flush(Duration::from_secs(self.config.initial_flush_delay_secs));
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.flush_timer.lock().expect("flush timer lock").take() {
            handle.abort();
        }
        if let Some(handle) = self.listener.lock().expect("listener lock").take() {
            handle.abort();
        }
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.store.pending_vote_count().await
    }
}
