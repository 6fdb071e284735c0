use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::application::services::{FlushOutcome, OfflineQueueService, SyncService, SyncStatus};
use crate::domain::entities::CachedVideo;
use crate::infrastructure::api::{ApiClient, UserInfoResponse, VoteRequest, VoteResponse};
use crate::infrastructure::database::CacheStore;
use crate::infrastructure::identity::{IdentityService, DEFAULT_PREFIX_LEN};
use crate::shared::error::Result;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSubmission {
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<VoteResponse>,
}

/// Collaborator-facing operations, consumed by the host's message dispatcher.
/// Hosts map `Err` values to their own `{success: false, error}` envelope.
pub struct Handlers {
    store: Arc<CacheStore>,
    api: Arc<ApiClient>,
    identity: Arc<IdentityService>,
    queue: Arc<OfflineQueueService>,
    sync: Arc<SyncService>,
    user_agent: String,
}

impl Handlers {
    pub fn new(
        store: Arc<CacheStore>,
        api: Arc<ApiClient>,
        identity: Arc<IdentityService>,
        queue: Arc<OfflineQueueService>,
        sync: Arc<SyncService>,
    ) -> Self {
        Self {
            store,
            api,
            identity,
            queue,
            sync,
            user_agent: format!("RealTube/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Serve requested videos from the cache, then look up the misses by hash
    /// prefix and cache-fill whatever the server knows about.
    pub async fn check_videos(&self, video_ids: &[String]) -> Result<Vec<CachedVideo>> {
        let mut records = self.store.get_videos(video_ids).await?;
        let cached: HashSet<String> = records.iter().map(|v| v.video_id.clone()).collect();

        let mut prefix_map: HashMap<String, HashSet<String>> = HashMap::new();
        for id in video_ids {
            if cached.contains(id) {
                continue;
            }
            let prefix = IdentityService::hash_video_id(id, DEFAULT_PREFIX_LEN);
            prefix_map.entry(prefix).or_default().insert(id.clone());
        }

        let mut fresh = Vec::new();
        for (prefix, requested) in prefix_map {
            let matches = self.api.lookup_videos_by_prefix(&prefix).await?;
            for video in matches {
                // The prefix lookup can return other videos sharing the prefix.
                if requested.contains(&video.video_id) {
                    fresh.push(CachedVideo::from(video));
                }
            }
        }

        self.store.put_videos(&fresh).await?;
        records.extend(fresh);
        Ok(records)
    }

    /// Submit a vote directly; if the server cannot be reached (or rejects the
    /// attempt), fall back to the offline queue so the vote is never lost.
    pub async fn submit_vote_or_queue(&self, video_id: &str, category: &str) -> Result<VoteSubmission> {
        let user_id = self.identity.public_user_id().await?;
        let request = VoteRequest {
            video_id: video_id.to_string(),
            category: category.to_string(),
            user_id,
            user_agent: self.user_agent.clone(),
        };

        match self.api.submit_vote(&request).await {
            Ok(response) => Ok(VoteSubmission {
                queued: false,
                response: Some(response),
            }),
            Err(err) => {
                tracing::warn!("Vote submission failed, queueing offline: {}", err);
                self.queue.enqueue(video_id, category).await?;
                Ok(VoteSubmission {
                    queued: true,
                    response: None,
                })
            }
        }
    }

    pub async fn delete_vote(&self, video_id: &str) -> Result<()> {
        let user_id = self.identity.public_user_id().await?;
        self.api.delete_vote(video_id, &user_id).await
    }

    pub async fn get_user_info(&self) -> Result<UserInfoResponse> {
        let user_id = self.identity.public_user_id().await?;
        self.api.get_user_info(&user_id).await
    }

    pub async fn get_sync_status(&self) -> Result<SyncStatus> {
        self.sync.get_sync_status().await
    }

    pub async fn flush_now(&self) -> Result<FlushOutcome> {
        self.queue.flush().await
    }

    pub async fn pending_vote_count(&self) -> Result<i64> {
        self.queue.pending_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::AlwaysOnline;
    use crate::infrastructure::database::ConnectionPool;
    use crate::shared::config::{ApiConfig, QueueConfig, SyncConfig};
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::net::TcpListener;

    async fn spawn_app(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock");
        });
        format!("http://{addr}")
    }

    async fn setup_handlers(base_url: String) -> (Handlers, Arc<CacheStore>) {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.initialize_schema().await.unwrap();
        let store = Arc::new(CacheStore::new(&pool));
        let api = Arc::new(ApiClient::new(&ApiConfig {
            base_url,
            max_retries: 0,
            base_delay_ms: 10,
        }));
        let identity = Arc::new(IdentityService::new(Arc::clone(&store)));
        let queue = Arc::new(OfflineQueueService::new(
            Arc::clone(&store),
            Arc::clone(&api),
            Arc::clone(&identity),
            Arc::new(AlwaysOnline::new()),
            QueueConfig {
                flush_retry_secs: 30,
                initial_flush_delay_secs: 5,
                max_pending_age_ms: 7 * 24 * 60 * 60 * 1000,
            },
        ));
        let sync = Arc::new(SyncService::new(
            Arc::clone(&store),
            Arc::clone(&api),
            SyncConfig {
                delta_interval_secs: 30 * 60,
                full_refresh_secs: 24 * 60 * 60,
                startup_delay_secs: 5,
            },
        ));
        let handlers = Handlers::new(Arc::clone(&store), api, identity, queue, sync);
        (handlers, store)
    }

    fn video_json(video_id: &str) -> serde_json::Value {
        serde_json::json!({
            "videoId": video_id,
            "score": 75.0,
            "categories": { "fully_ai": { "votes": 3, "weightedScore": 75.0 } },
            "totalVotes": 3,
            "locked": false,
            "channelId": "ch1",
            "channelScore": 50.0,
            "lastUpdated": "2025-06-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_check_videos_merges_cache_and_lookup() {
        let wanted = "remote-vid".to_string();
        let app = Router::new().route(
            "/api/videos/{prefix}",
            get(move |Path(_prefix): Path<String>| async move {
                // One requested hit plus an unrelated video sharing the prefix.
                Json(serde_json::json!([
                    video_json("remote-vid"),
                    video_json("unrequested-vid"),
                ]))
            }),
        );
        let base_url = spawn_app(app).await;
        let (handlers, store) = setup_handlers(base_url).await;

        store
            .put_video(&CachedVideo::from(
                serde_json::from_value::<crate::infrastructure::api::VideoResult>(video_json(
                    "cached-vid",
                ))
                .unwrap(),
            ))
            .await
            .unwrap();

        let records = handlers
            .check_videos(&["cached-vid".to_string(), wanted])
            .await
            .unwrap();

        let ids: HashSet<&str> = records.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["cached-vid", "remote-vid"]));
        // The lookup result was cache-filled; the unrequested one was not.
        assert!(store.get_video("remote-vid").await.unwrap().is_some());
        assert!(store.get_video("unrequested-vid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_vote_or_queue_returns_server_response_when_online() {
        let app = Router::new().route(
            "/api/votes",
            post(|| async {
                Json(serde_json::json!({
                    "success": true,
                    "newScore": 66.0,
                    "userTrust": 0.9
                }))
            }),
        );
        let base_url = spawn_app(app).await;
        let (handlers, _store) = setup_handlers(base_url).await;

        let submission = handlers
            .submit_vote_or_queue("vid1", "fully_ai")
            .await
            .unwrap();

        assert!(!submission.queued);
        assert_eq!(submission.response.unwrap().new_score, 66.0);
        assert_eq!(handlers.pending_vote_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_submit_vote_or_queue_falls_back_to_queue_on_failure() {
        let app = Router::new().route(
            "/api/votes",
            post(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let base_url = spawn_app(app).await;
        let (handlers, store) = setup_handlers(base_url).await;

        let submission = handlers
            .submit_vote_or_queue("vid1", "fully_ai")
            .await
            .unwrap();

        assert!(submission.queued);
        assert!(submission.response.is_none());
        let votes = store.pending_votes().await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].video_id, "vid1");
    }
}
