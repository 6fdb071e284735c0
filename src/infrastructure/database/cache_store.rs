use sqlx::{FromRow, SqlitePool};

use super::connection_pool::ConnectionPool;
use crate::domain::entities::{CachedChannel, CachedVideo, PendingVote};
use crate::shared::error::{AppError, Result};

/// Durable store for the four local collections: videos, channels, pending
/// votes, and scalar sync metadata. Callers pass values in and get copies out;
/// nothing else holds a reference to persisted state.
pub struct CacheStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct VideoRow {
    video_id: String,
    score: f64,
    categories: String,
    channel_id: String,
    last_updated: String,
}

#[derive(Debug, FromRow)]
struct ChannelRow {
    channel_id: String,
    score: f64,
    auto_flag: bool,
    last_updated: String,
}

#[derive(Debug, FromRow)]
struct PendingVoteRow {
    video_id: String,
    category: String,
    timestamp: i64,
}

impl TryFrom<VideoRow> for CachedVideo {
    type Error = AppError;

    fn try_from(row: VideoRow) -> Result<Self> {
        Ok(CachedVideo {
            video_id: row.video_id,
            score: row.score,
            categories: serde_json::from_str(&row.categories)?,
            channel_id: row.channel_id,
            last_updated: row.last_updated,
        })
    }
}

impl From<ChannelRow> for CachedChannel {
    fn from(row: ChannelRow) -> Self {
        CachedChannel {
            channel_id: row.channel_id,
            score: row.score,
            auto_flag: row.auto_flag,
            last_updated: row.last_updated,
        }
    }
}

impl From<PendingVoteRow> for PendingVote {
    fn from(row: PendingVoteRow) -> Self {
        PendingVote {
            video_id: row.video_id,
            category: row.category,
            timestamp: row.timestamp,
        }
    }
}

impl CacheStore {
    pub fn new(pool: &ConnectionPool) -> Self {
        Self {
            pool: pool.get_pool().clone(),
        }
    }

    // --- Video operations ---

    pub async fn get_video(&self, video_id: &str) -> Result<Option<CachedVideo>> {
        let row = sqlx::query_as::<_, VideoRow>("SELECT * FROM cached_videos WHERE video_id = ?1")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CachedVideo::try_from).transpose()
    }

    /// Ids that are absent are silently omitted from the result.
    pub async fn get_videos(&self, video_ids: &[String]) -> Result<Vec<CachedVideo>> {
        let mut videos = Vec::new();
        for id in video_ids {
            if let Some(video) = self.get_video(id).await? {
                videos.push(video);
            }
        }
        Ok(videos)
    }

    pub async fn put_video(&self, video: &CachedVideo) -> Result<()> {
        let categories = serde_json::to_string(&video.categories)?;
        sqlx::query(
            r#"
            INSERT INTO cached_videos (video_id, score, categories, channel_id, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(video_id) DO UPDATE SET
                score = excluded.score,
                categories = excluded.categories,
                channel_id = excluded.channel_id,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&video.video_id)
        .bind(video.score)
        .bind(&categories)
        .bind(&video.channel_id)
        .bind(&video.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Batch upsert inside one transaction: either every record lands or none
    /// do. An empty batch performs no I/O at all.
    pub async fn put_videos(&self, videos: &[CachedVideo]) -> Result<()> {
        if videos.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for video in videos {
            let categories = serde_json::to_string(&video.categories)?;
            sqlx::query(
                r#"
                INSERT INTO cached_videos (video_id, score, categories, channel_id, last_updated)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(video_id) DO UPDATE SET
                    score = excluded.score,
                    categories = excluded.categories,
                    channel_id = excluded.channel_id,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&video.video_id)
            .bind(video.score)
            .bind(&categories)
            .bind(&video.channel_id)
            .bind(&video.last_updated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn delete_video(&self, video_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM cached_videos WHERE video_id = ?1")
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_videos(&self) -> Result<()> {
        sqlx::query("DELETE FROM cached_videos")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn video_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cached_videos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- Channel operations ---

    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<CachedChannel>> {
        let row =
            sqlx::query_as::<_, ChannelRow>("SELECT * FROM cached_channels WHERE channel_id = ?1")
                .bind(channel_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(CachedChannel::from))
    }

    pub async fn put_channel(&self, channel: &CachedChannel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cached_channels (channel_id, score, auto_flag, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(channel_id) DO UPDATE SET
                score = excluded.score,
                auto_flag = excluded.auto_flag,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&channel.channel_id)
        .bind(channel.score)
        .bind(channel.auto_flag)
        .bind(&channel.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn put_channels(&self, channels: &[CachedChannel]) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for channel in channels {
            sqlx::query(
                r#"
                INSERT INTO cached_channels (channel_id, score, auto_flag, last_updated)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(channel_id) DO UPDATE SET
                    score = excluded.score,
                    auto_flag = excluded.auto_flag,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&channel.channel_id)
            .bind(channel.score)
            .bind(channel.auto_flag)
            .bind(&channel.last_updated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM cached_channels WHERE channel_id = ?1")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_channels(&self) -> Result<()> {
        sqlx::query("DELETE FROM cached_channels")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn channel_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cached_channels")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- Pending vote operations (offline queue) ---

    /// Upsert keyed by video id: a later vote for the same video replaces the
    /// earlier one rather than appending.
    pub async fn add_pending_vote(&self, vote: &PendingVote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_votes (video_id, category, timestamp)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(video_id) DO UPDATE SET
                category = excluded.category,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(&vote.video_id)
        .bind(&vote.category)
        .bind(vote.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All pending votes, oldest enqueue first.
    pub async fn pending_votes(&self) -> Result<Vec<PendingVote>> {
        let rows = sqlx::query_as::<_, PendingVoteRow>(
            "SELECT * FROM pending_votes ORDER BY timestamp ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PendingVote::from).collect())
    }

    pub async fn remove_pending_vote(&self, video_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_votes WHERE video_id = ?1")
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn clear_pending_votes(&self) -> Result<()> {
        sqlx::query("DELETE FROM pending_votes")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn pending_vote_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pending_votes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- Meta operations (sync checkpoints, local identity) ---

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value =
            sqlx::query_scalar::<_, String>("SELECT value FROM sync_meta WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
