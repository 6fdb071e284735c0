use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::json;

use super::types::{
    ApiErrorBody, SyncDeltaResponse, SyncFullResponse, UserInfoResponse, VideoResult, VoteRequest,
    VoteResponse,
};
use crate::shared::config::{sanitize_base_url, ApiConfig};
use crate::shared::error::{AppError, Result};

/// One outbound request per logical operation; transient failures (transport
/// errors and HTTP 429) are absorbed by a shared retry/backoff policy.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: sanitize_base_url(&config.base_url),
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Attempts the request up to `max_retries + 1` times. Transport failures
    /// and 429 responses share the same attempt counter; any other response is
    /// returned as-is for the operation to interpret.
    async fn execute_with_retry(&self, request: RequestBuilder) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            let prepared = request
                .try_clone()
                .ok_or_else(|| AppError::Internal("request is not retryable".to_string()))?;

            match prepared.send().await {
                Ok(response) => {
                    if response.status() == StatusCode::TOO_MANY_REQUESTS
                        && attempt < self.max_retries
                    {
                        let delay = retry_after_secs(&response)
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.backoff_delay(attempt));
                        tracing::info!("Rate limited, retrying in {:?}", delay);
                        tokio::time::sleep(delay).await;
                    } else {
                        return Ok(response);
                    }
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        let delay = self.backoff_delay(attempt);
                        tracing::info!(
                            "Request failed, retrying in {:?} (attempt {}/{}): {}",
                            delay,
                            attempt + 1,
                            self.max_retries,
                            err
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        return Err(AppError::Network(err.to_string()));
                    }
                }
            }

            attempt += 1;
        }
    }

    /// Lookup videos by hash prefix (privacy-preserving). 404 means no record
    /// shares the prefix and yields an empty list, not an error.
    pub async fn lookup_videos_by_prefix(&self, hash_prefix: &str) -> Result<Vec<VideoResult>> {
        let url = format!("{}/api/videos/{}", self.base_url, hash_prefix);
        let response = self.execute_with_retry(self.http.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(error_from_response(response, "Video lookup").await);
        }
        Ok(response.json().await?)
    }

    pub async fn submit_vote(&self, vote: &VoteRequest) -> Result<VoteResponse> {
        let url = format!("{}/api/votes", self.base_url);
        let response = self
            .execute_with_retry(self.http.post(&url).json(vote))
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Vote").await);
        }
        Ok(response.json().await?)
    }

    pub async fn delete_vote(&self, video_id: &str, user_id: &str) -> Result<()> {
        let url = format!("{}/api/votes", self.base_url);
        let body = json!({ "videoId": video_id, "userId": user_id });
        let response = self
            .execute_with_retry(self.http.delete(&url).json(&body))
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Delete vote").await);
        }
        Ok(())
    }

    pub async fn sync_delta(&self, since: &str) -> Result<SyncDeltaResponse> {
        let url = format!("{}/api/sync/delta", self.base_url);
        let response = self
            .execute_with_retry(self.http.get(&url).query(&[("since", since)]))
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Sync delta").await);
        }
        Ok(response.json().await?)
    }

    pub async fn sync_full(&self) -> Result<SyncFullResponse> {
        let url = format!("{}/api/sync/full", self.base_url);
        let response = self.execute_with_retry(self.http.get(&url)).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "Sync full").await);
        }
        Ok(response.json().await?)
    }

    pub async fn get_user_info(&self, user_id: &str) -> Result<UserInfoResponse> {
        let url = format!("{}/api/users/{}", self.base_url, user_id);
        let response = self.execute_with_retry(self.http.get(&url)).await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "User info").await);
        }
        Ok(response.json().await?)
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// Map a non-2xx response to a typed error. 429 keeps its retry hint so callers
/// can branch on rate limiting without inspecting message strings.
async fn error_from_response(response: Response, context: &str) -> AppError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AppError::RateLimited {
            retry_after: retry_after_secs(&response),
        };
    }

    let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .and_then(|detail| detail.message)
        .unwrap_or_else(|| format!("{} failed: {}", context, status.as_u16()));

    AppError::Api {
        status: status.as_u16(),
        message,
    }
}
