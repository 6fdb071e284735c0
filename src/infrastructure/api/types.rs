use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::entities::CategoryStat;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub video_id: String,
    pub category: String,
    pub user_id: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub success: bool,
    pub new_score: f64,
    pub user_trust: f64,
}

/// A video record as returned by the prefix lookup and full sync endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    pub video_id: String,
    pub score: f64,
    pub categories: HashMap<String, CategoryStat>,
    pub total_votes: u32,
    pub locked: bool,
    pub channel_id: String,
    pub channel_score: f64,
    pub last_updated: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaAction {
    Update,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDelta {
    pub video_id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub categories: Option<HashMap<String, CategoryStat>>,
    pub action: DeltaAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDelta {
    pub channel_id: String,
    #[serde(default)]
    pub score: Option<f64>,
    pub action: DeltaAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDeltaResponse {
    pub videos: Vec<VideoDelta>,
    pub channels: Vec<ChannelDelta>,
    pub sync_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub channel_id: String,
    pub score: f64,
    pub total_videos: u32,
    pub flagged_videos: u32,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFullResponse {
    pub videos: Vec<VideoResult>,
    pub channels: Vec<ChannelSummary>,
    #[serde(default)]
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub user_id: String,
    pub trust_score: f64,
    pub total_votes: u32,
    pub accuracy_rate: f64,
    pub account_age: u32,
    pub is_vip: bool,
}

impl From<VideoResult> for crate::domain::entities::CachedVideo {
    fn from(result: VideoResult) -> Self {
        Self {
            video_id: result.video_id,
            score: result.score,
            categories: result.categories,
            channel_id: result.channel_id,
            last_updated: result.last_updated,
        }
    }
}

/// Error envelope some endpoints return: `{"error": {"message": "..."}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}
