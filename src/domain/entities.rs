use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-category vote tally for a cached video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    pub votes: u32,
    pub weighted_score: f64,
}

/// Local replica of a server-side video reputation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedVideo {
    pub video_id: String,
    pub score: f64,
    pub categories: HashMap<String, CategoryStat>,
    pub channel_id: String,
    pub last_updated: String,
}

/// Local replica of a server-side channel reputation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedChannel {
    pub channel_id: String,
    pub score: f64,
    pub auto_flag: bool,
    pub last_updated: String,
}

/// A vote buffered while the network was unavailable. At most one pending vote
/// exists per video; a later enqueue overwrites the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVote {
    pub video_id: String,
    pub category: String,
    /// Epoch milliseconds at enqueue time.
    pub timestamp: i64,
}
