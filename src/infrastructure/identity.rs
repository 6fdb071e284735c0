use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::infrastructure::database::CacheStore;
use crate::shared::error::Result;

const LOCAL_ID_META_KEY: &str = "realtube_local_id";
const HASH_ITERATIONS: u32 = 5000;
pub const DEFAULT_PREFIX_LEN: usize = 4;

/// Anonymous identity: a private local UUID that never leaves the device, and a
/// public user id derived from it by iterated SHA-256.
pub struct IdentityService {
    store: Arc<CacheStore>,
    // Derived once per process; the derivation is deliberately expensive.
    cached_public_id: Mutex<Option<String>>,
}

impl IdentityService {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self {
            store,
            cached_public_id: Mutex::new(None),
        }
    }

    /// Get or create the local UUID. Private, never sent to the server.
    pub async fn local_id(&self) -> Result<String> {
        if let Some(existing) = self.store.get_meta(LOCAL_ID_META_KEY).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        self.store.set_meta(LOCAL_ID_META_KEY, &id).await?;
        tracing::info!("Generated new local ID");
        Ok(id)
    }

    /// Public user id: 5000 rounds of hex-encoded SHA-256 over the local UUID.
    pub async fn public_user_id(&self) -> Result<String> {
        let mut cached = self.cached_public_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let local_id = self.local_id().await?;
        let public_id = iterated_hash(&local_id, HASH_ITERATIONS);
        *cached = Some(public_id.clone());
        Ok(public_id)
    }

    /// SHA-256 hex prefix of a video id, for privacy-preserving lookups.
    pub fn hash_video_id(video_id: &str, prefix_len: usize) -> String {
        let digest = sha256_hex(video_id);
        digest[..prefix_len.min(digest.len())].to_string()
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn iterated_hash(input: &str, iterations: u32) -> String {
    let mut value = input.to_string();
    for _ in 0..iterations {
        value = sha256_hex(&value);
    }
    value
}
