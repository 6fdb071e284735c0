pub mod client;
pub mod types;

pub use client::ApiClient;
pub use types::{
    ChannelDelta, ChannelSummary, DeltaAction, SyncDeltaResponse, SyncFullResponse,
    UserInfoResponse, VideoDelta, VideoResult, VoteRequest, VoteResponse,
};
