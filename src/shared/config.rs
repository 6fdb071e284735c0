use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub delta_interval_secs: u64,
    pub full_refresh_secs: u64,
    pub startup_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub flush_retry_secs: u64,
    pub initial_flush_delay_secs: u64,
    pub max_pending_age_ms: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/realtube.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                max_retries: 3,
                base_delay_ms: 1000,
            },
            sync: SyncConfig {
                delta_interval_secs: 30 * 60,
                full_refresh_secs: 24 * 60 * 60,
                startup_delay_secs: 5,
            },
            queue: QueueConfig {
                flush_retry_secs: 30,
                initial_flush_delay_secs: 5,
                max_pending_age_ms: 7 * 24 * 60 * 60 * 1000,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("REALTUBE_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("REALTUBE_API_URL") {
            cfg.api.base_url = sanitize_base_url(&v);
        }
        if let Ok(v) = std::env::var("REALTUBE_SYNC_INTERVAL_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.delta_interval_secs = value.max(1);
            }
        }
        if let Ok(v) = std::env::var("REALTUBE_FULL_REFRESH_SECS") {
            if let Some(value) = parse_u64(&v) {
                cfg.sync.full_refresh_secs = value.max(1);
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.delta_interval_secs == 0 {
            return Err("Sync delta_interval_secs must be greater than 0".to_string());
        }
        if self.queue.max_pending_age_ms <= 0 {
            return Err("Queue max_pending_age_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Accept only https endpoints or localhost; anything else falls back to the
/// default so a tampered setting cannot redirect votes to a plaintext host.
pub fn sanitize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    if trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("http://") {
        let host = rest.split([':', '/']).next().unwrap_or("");
        if host == "localhost" || host == "127.0.0.1" {
            return trimmed.to_string();
        }
    }
    tracing::warn!("Rejecting untrusted API base URL {:?}, using default", raw);
    DEFAULT_BASE_URL.to_string()
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
