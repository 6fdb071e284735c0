use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::task::JoinHandle;

use crate::domain::entities::{CachedChannel, CachedVideo};
use crate::infrastructure::api::{ApiClient, DeltaAction};
use crate::infrastructure::database::CacheStore;
use crate::shared::config::SyncConfig;
use crate::shared::error::{AppError, Result};

pub const META_LAST_DELTA_SYNC: &str = "lastDeltaSync";
pub const META_LAST_FULL_SYNC: &str = "lastFullSync";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncReport {
    pub videos_updated: u32,
    pub videos_removed: u32,
    pub channels_updated: u32,
    pub channels_removed: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncReport {
    pub video_count: u32,
    pub channel_count: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_delta_sync: Option<String>,
    pub last_full_sync: Option<String>,
    pub video_count: i64,
    pub channel_count: i64,
}

/// Keeps the local replica consistent with server state via two protocols:
/// incremental delta sync against a checkpoint, and a full snapshot rebuild.
pub struct SyncService {
    store: Arc<CacheStore>,
    api: Arc<ApiClient>,
    config: SyncConfig,
    schedule: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(store: Arc<CacheStore>, api: Arc<ApiClient>, config: SyncConfig) -> Self {
        Self {
            store,
            api,
            config,
            schedule: Mutex::new(None),
        }
    }

    /// Fetch and apply changes since the last delta checkpoint. A rate-limited
    /// remote is treated as "try again next cycle" and yields a zero report.
    pub async fn perform_delta_sync(&self) -> Result<DeltaSyncReport> {
        let since = match self.store.get_meta(META_LAST_DELTA_SYNC).await? {
            Some(checkpoint) => checkpoint,
            None => epoch_timestamp(),
        };
        tracing::debug!("Delta sync since {}", since);

        let data = match self.api.sync_delta(&since).await {
            Ok(data) => data,
            Err(AppError::RateLimited { .. }) => {
                tracing::warn!("Delta sync rate limited, deferring to next cycle");
                return Ok(DeltaSyncReport::default());
            }
            Err(err) => return Err(err),
        };

        let mut report = DeltaSyncReport::default();

        let mut videos_to_upsert = Vec::new();
        for video in data.videos {
            match video.action {
                DeltaAction::Remove => {
                    self.store.delete_video(&video.video_id).await?;
                    report.videos_removed += 1;
                }
                DeltaAction::Update => {
                    if let (Some(score), Some(categories)) = (video.score, video.categories) {
                        videos_to_upsert.push(CachedVideo {
                            video_id: video.video_id,
                            score,
                            categories,
                            // Delta entries do not carry the channel id.
                            channel_id: String::new(),
                            last_updated: data.sync_timestamp.clone(),
                        });
                        report.videos_updated += 1;
                    }
                }
            }
        }
        self.store.put_videos(&videos_to_upsert).await?;

        let mut channels_to_upsert = Vec::new();
        for channel in data.channels {
            match channel.action {
                DeltaAction::Remove => {
                    self.store.delete_channel(&channel.channel_id).await?;
                    report.channels_removed += 1;
                }
                DeltaAction::Update => {
                    if let Some(score) = channel.score {
                        channels_to_upsert.push(CachedChannel {
                            channel_id: channel.channel_id,
                            score,
                            auto_flag: false,
                            last_updated: data.sync_timestamp.clone(),
                        });
                        report.channels_updated += 1;
                    }
                }
            }
        }
        self.store.put_channels(&channels_to_upsert).await?;

        self.store
            .set_meta(META_LAST_DELTA_SYNC, &data.sync_timestamp)
            .await?;

        tracing::info!(
            "Delta sync complete: {} videos updated, {} removed, {} channels updated, {} removed",
            report.videos_updated,
            report.videos_removed,
            report.channels_updated,
            report.channels_removed
        );

        Ok(report)
    }

    /// Rebuild the entire replica from a server snapshot. A full sync subsumes
    /// all pending deltas, so it advances both checkpoints.
    pub async fn perform_full_sync(&self) -> Result<FullSyncReport> {
        tracing::info!("Full sync starting");

        let data = match self.api.sync_full().await {
            Ok(data) => data,
            Err(AppError::RateLimited { .. }) => {
                tracing::warn!("Full sync rate limited, deferring to next cycle");
                return Ok(FullSyncReport::default());
            }
            Err(err) => return Err(err),
        };

        self.store.clear_videos().await?;
        self.store.clear_channels().await?;

        let videos: Vec<CachedVideo> = data
            .videos
            .into_iter()
            .map(|v| CachedVideo {
                video_id: v.video_id,
                score: v.score,
                categories: v.categories,
                channel_id: v.channel_id,
                last_updated: v.last_updated,
            })
            .collect();
        self.store.put_videos(&videos).await?;

        let channels: Vec<CachedChannel> = data
            .channels
            .into_iter()
            .map(|c| CachedChannel {
                channel_id: c.channel_id,
                score: c.score,
                // The snapshot omits the flag; it is re-derived by later deltas.
                auto_flag: false,
                last_updated: c.last_updated,
            })
            .collect();
        self.store.put_channels(&channels).await?;

        let now = data.generated_at.unwrap_or_else(current_timestamp);
        self.store.set_meta(META_LAST_FULL_SYNC, &now).await?;
        self.store.set_meta(META_LAST_DELTA_SYNC, &now).await?;

        let report = FullSyncReport {
            video_count: videos.len() as u32,
            channel_count: channels.len() as u32,
        };
        tracing::info!(
            "Full sync complete: {} videos, {} channels",
            report.video_count,
            report.channel_count
        );

        Ok(report)
    }

    /// Full sync when the full-sync checkpoint is missing or stale, delta sync
    /// otherwise.
    pub async fn auto_sync(&self) -> Result<()> {
        let last_full = self.store.get_meta(META_LAST_FULL_SYNC).await?;
        let needs_full = match last_full
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            Some(checkpoint) => {
                let age = Utc::now().signed_duration_since(checkpoint.with_timezone(&Utc));
                age > chrono::Duration::seconds(self.config.full_refresh_secs as i64)
            }
            None => true,
        };

        if needs_full {
            self.perform_full_sync().await?;
        } else {
            self.perform_delta_sync().await?;
        }
        Ok(())
    }

    /// Start (or restart) the background schedule: one initial sync shortly
    /// after startup, then a sync every delta interval. Calling this again
    /// cancels the previous schedule, so timers never duplicate.
    pub fn start_schedule(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let startup_delay = Duration::from_secs(self.config.startup_delay_secs);
        let period = Duration::from_secs(self.config.delta_interval_secs);

        let mut guard = self.schedule.lock().expect("schedule lock");
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            loop {
                if let Err(err) = service.auto_sync().await {
                    tracing::error!("Auto-sync failed: {}", err);
                }
                tokio::time::sleep(period).await;
            }
        }));

        tracing::info!(
            "Sync schedule started (delta every {}s, full refresh after {}s)",
            self.config.delta_interval_secs,
            self.config.full_refresh_secs
        );
    }

    pub fn stop_schedule(&self) {
        if let Some(handle) = self.schedule.lock().expect("schedule lock").take() {
            handle.abort();
            tracing::info!("Sync schedule stopped");
        }
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            last_delta_sync: self.store.get_meta(META_LAST_DELTA_SYNC).await?,
            last_full_sync: self.store.get_meta(META_LAST_FULL_SYNC).await?,
            video_count: self.store.video_count().await?,
            channel_count: self.store.channel_count().await?,
        })
    }
}

fn epoch_timestamp() -> String {
    DateTime::<Utc>::UNIX_EPOCH.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::CategoryStat;
    use crate::infrastructure::database::ConnectionPool;
    use crate::shared::config::ApiConfig;
    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    async fn setup_store() -> Arc<CacheStore> {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.initialize_schema().await.unwrap();
        Arc::new(CacheStore::new(&pool))
    }

    async fn spawn_app(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock");
        });
        format!("http://{addr}")
    }

    fn test_service(store: Arc<CacheStore>, base_url: String) -> SyncService {
        let api = Arc::new(ApiClient::new(&ApiConfig {
            base_url,
            max_retries: 0,
            base_delay_ms: 10,
        }));
        SyncService::new(
            store,
            api,
            SyncConfig {
                delta_interval_secs: 30 * 60,
                full_refresh_secs: 24 * 60 * 60,
                startup_delay_secs: 5,
            },
        )
    }

    fn seeded_video(video_id: &str) -> CachedVideo {
        let mut categories = HashMap::new();
        categories.insert(
            "fully_ai".to_string(),
            CategoryStat {
                votes: 5,
                weighted_score: 70.0,
            },
        );
        CachedVideo {
            video_id: video_id.to_string(),
            score: 70.0,
            categories,
            channel_id: "old-ch".to_string(),
            last_updated: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_delta_sync_without_checkpoint_uses_epoch() {
        let seen_since = Arc::new(std::sync::Mutex::new(None::<String>));
        let capture = Arc::clone(&seen_since);

        let app = Router::new().route(
            "/api/sync/delta",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let capture = Arc::clone(&capture);
                async move {
                    *capture.lock().unwrap() = params.get("since").cloned();
                    Json(serde_json::json!({
                        "videos": [],
                        "channels": [],
                        "syncTimestamp": "2025-06-01T00:00:00Z"
                    }))
                }
            }),
        );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        let service = test_service(Arc::clone(&store), base_url);

        let report = service.perform_delta_sync().await.unwrap();

        assert_eq!(report, DeltaSyncReport::default());
        assert_eq!(
            seen_since.lock().unwrap().as_deref(),
            Some("1970-01-01T00:00:00.000Z")
        );
        assert_eq!(
            store.get_meta(META_LAST_DELTA_SYNC).await.unwrap().as_deref(),
            Some("2025-06-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_delta_sync_applies_updates_and_removals() {
        let app = Router::new().route(
            "/api/sync/delta",
            get(|| async {
                Json(serde_json::json!({
                    "videos": [
                        {
                            "videoId": "vid-upd",
                            "score": 92.0,
                            "categories": {
                                "fully_ai": { "votes": 10, "weightedScore": 92.0 }
                            },
                            "action": "update"
                        },
                        { "videoId": "vid-gone", "action": "remove" },
                        // Update without score/categories is skipped entirely.
                        { "videoId": "vid-partial", "action": "update" }
                    ],
                    "channels": [
                        { "channelId": "ch-upd", "score": 33.0, "action": "update" },
                        { "channelId": "ch-gone", "action": "remove" }
                    ],
                    "syncTimestamp": "2025-06-02T00:00:00Z"
                }))
            }),
        );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        store.put_video(&seeded_video("vid-gone")).await.unwrap();
        let service = test_service(Arc::clone(&store), base_url);

        let report = service.perform_delta_sync().await.unwrap();

        assert_eq!(report.videos_updated, 1);
        assert_eq!(report.videos_removed, 1);
        assert_eq!(report.channels_updated, 1);
        assert_eq!(report.channels_removed, 1);

        assert!(store.get_video("vid-gone").await.unwrap().is_none());
        assert!(store.get_video("vid-partial").await.unwrap().is_none());
        let updated = store.get_video("vid-upd").await.unwrap().unwrap();
        assert_eq!(updated.score, 92.0);
        assert_eq!(updated.last_updated, "2025-06-02T00:00:00Z");
        assert_eq!(updated.channel_id, "");

        let channel = store.get_channel("ch-upd").await.unwrap().unwrap();
        assert!(!channel.auto_flag);
    }

    #[tokio::test]
    async fn test_delta_remove_of_absent_record_is_counted_noop() {
        let app = Router::new().route(
            "/api/sync/delta",
            get(|| async {
                Json(serde_json::json!({
                    "videos": [ { "videoId": "x", "action": "remove" } ],
                    "channels": [],
                    "syncTimestamp": "2025-06-03T00:00:00Z"
                }))
            }),
        );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        let service = test_service(Arc::clone(&store), base_url);

        let report = service.perform_delta_sync().await.unwrap();

        assert_eq!(report.videos_removed, 1);
        assert_eq!(store.video_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delta_sync_swallows_rate_limit() {
        let app = Router::new().route(
            "/api/sync/delta",
            get(|| async { AxumStatus::TOO_MANY_REQUESTS }),
        );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        let service = test_service(Arc::clone(&store), base_url);

        let report = service.perform_delta_sync().await.unwrap();

        assert_eq!(report, DeltaSyncReport::default());
        // Checkpoint untouched, so the next cycle retries the same window.
        assert!(store.get_meta(META_LAST_DELTA_SYNC).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delta_sync_propagates_server_errors() {
        let app = Router::new().route(
            "/api/sync/delta",
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let base_url = spawn_app(app).await;
        let service = test_service(setup_store().await, base_url);

        let err = service.perform_delta_sync().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_full_sync_replaces_replica_and_sets_both_checkpoints() {
        let app = Router::new().route(
            "/api/sync/full",
            get(|| async {
                Json(serde_json::json!({
                    "videos": [{
                        "videoId": "fresh-vid",
                        "score": 90.0,
                        "categories": {
                            "fully_ai": { "votes": 20, "weightedScore": 90.0 }
                        },
                        "totalVotes": 20,
                        "locked": false,
                        "channelId": "fresh-ch",
                        "channelScore": 80.0,
                        "lastUpdated": "2025-06-01T00:00:00Z"
                    }],
                    "channels": [{
                        "channelId": "fresh-ch",
                        "score": 80.0,
                        "totalVideos": 4,
                        "flaggedVideos": 2,
                        "lastUpdated": "2025-06-01T00:00:00Z"
                    }],
                    "generatedAt": "2025-06-01T00:00:00Z"
                }))
            }),
        );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        store.put_video(&seeded_video("old-vid")).await.unwrap();
        let service = test_service(Arc::clone(&store), base_url);

        let report = service.perform_full_sync().await.unwrap();

        assert_eq!(report.video_count, 1);
        assert_eq!(report.channel_count, 1);
        assert!(store.get_video("old-vid").await.unwrap().is_none());
        assert!(store.get_video("fresh-vid").await.unwrap().is_some());
        assert_eq!(
            store.get_meta(META_LAST_FULL_SYNC).await.unwrap().as_deref(),
            Some("2025-06-01T00:00:00Z")
        );
        assert_eq!(
            store.get_meta(META_LAST_DELTA_SYNC).await.unwrap().as_deref(),
            Some("2025-06-01T00:00:00Z")
        );

        let channel = store.get_channel("fresh-ch").await.unwrap().unwrap();
        assert!(!channel.auto_flag);
    }

    #[tokio::test]
    async fn test_auto_sync_picks_full_then_delta() {
        let full_calls = Arc::new(AtomicUsize::new(0));
        let delta_calls = Arc::new(AtomicUsize::new(0));
        let full_counter = Arc::clone(&full_calls);
        let delta_counter = Arc::clone(&delta_calls);

        let app = Router::new()
            .route(
                "/api/sync/full",
                get(move || {
                    let full_counter = Arc::clone(&full_counter);
                    async move {
                        full_counter.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({
                            "videos": [],
                            "channels": [],
                            "generatedAt": Utc::now().to_rfc3339()
                        }))
                    }
                }),
            )
            .route(
                "/api/sync/delta",
                get(move || {
                    let delta_counter = Arc::clone(&delta_counter);
                    async move {
                        delta_counter.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({
                            "videos": [],
                            "channels": [],
                            "syncTimestamp": Utc::now().to_rfc3339()
                        }))
                    }
                }),
            );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        let service = test_service(Arc::clone(&store), base_url);

        // No full-sync checkpoint: first run must be a full sync.
        service.auto_sync().await.unwrap();
        assert_eq!(full_calls.load(Ordering::SeqCst), 1);
        assert_eq!(delta_calls.load(Ordering::SeqCst), 0);

        // Fresh checkpoint: second run is a delta sync.
        service.auto_sync().await.unwrap();
        assert_eq!(full_calls.load(Ordering::SeqCst), 1);
        assert_eq!(delta_calls.load(Ordering::SeqCst), 1);

        // Stale checkpoint forces a full sync again.
        store
            .set_meta(META_LAST_FULL_SYNC, "2020-01-01T00:00:00Z")
            .await
            .unwrap();
        service.auto_sync().await.unwrap();
        assert_eq!(full_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_restarting_schedule_does_not_duplicate_timers() {
        let full_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&full_calls);

        let app = Router::new().route(
            "/api/sync/full",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "videos": [],
                        "channels": [],
                        "generatedAt": Utc::now().to_rfc3339()
                    }))
                }
            }),
        );
        let base_url = spawn_app(app).await;
        let store = setup_store().await;
        let api = Arc::new(ApiClient::new(&ApiConfig {
            base_url,
            max_retries: 0,
            base_delay_ms: 10,
        }));
        let service = Arc::new(SyncService::new(
            store,
            api,
            SyncConfig {
                delta_interval_secs: 3600,
                full_refresh_secs: 24 * 60 * 60,
                startup_delay_secs: 0,
            },
        ));

        service.start_schedule();
        service.start_schedule();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // One surviving schedule, so one startup sync despite two starts.
        assert_eq!(full_calls.load(Ordering::SeqCst), 1);
        service.stop_schedule();
    }

    #[tokio::test]
    async fn test_get_sync_status_composes_checkpoints_and_counts() {
        let store = setup_store().await;
        store.put_video(&seeded_video("vid1")).await.unwrap();
        store
            .set_meta(META_LAST_DELTA_SYNC, "2025-06-01T00:00:00Z")
            .await
            .unwrap();
        let service = test_service(Arc::clone(&store), "http://localhost:9".to_string());

        let status = service.get_sync_status().await.unwrap();

        assert_eq!(status.video_count, 1);
        assert_eq!(status.channel_count, 0);
        assert_eq!(
            status.last_delta_sync.as_deref(),
            Some("2025-06-01T00:00:00Z")
        );
        assert!(status.last_full_sync.is_none());
    }
}
