//! Queue item repository
//!
//! Every write here runs inside a caller-owned transaction holding the
//! playlist advisory lock, so the generic executor variants dominate.

use sqlx::{FromRow, PgPool};

use crate::{
    models::{ItemId, PageParams, PlaylistId, PlaylistItem, QueueEntry},
    Result,
};

const ITEM_COLUMNS: &str = "id, playlist, media, order_key, added_at";

/// Queue item repository
#[derive(Clone)]
pub struct QueueRepository {
    pool: PgPool,
}

impl QueueRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one queue item
    pub async fn insert<'e, E>(&self, item: &PlaylistItem, executor: E) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r"
            INSERT INTO playlist_items (id, playlist, media, order_key)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(item.id.as_str())
        .bind(item.playlist.as_str())
        .bind(item.media.as_str())
        .bind(item.order_key)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Fetch one item of a playlist
    pub async fn get_item<'e, E>(
        &self,
        playlist: &PlaylistId,
        item: &ItemId,
        executor: E,
    ) -> Result<Option<PlaylistItem>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM playlist_items WHERE playlist = $1 AND id = $2"
        ))
        .bind(playlist.as_str())
        .bind(item.as_str())
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Some(PlaylistItem::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Whether the item belongs to the playlist
    pub async fn exists_in<'e, E>(
        &self,
        playlist: &PlaylistId,
        item: &ItemId,
        executor: E,
    ) -> Result<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM playlist_items WHERE playlist = $1 AND id = $2)",
        )
        .bind(playlist.as_str())
        .bind(item.as_str())
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// Number of items in the playlist
    pub async fn item_count<'e, E>(&self, playlist: &PlaylistId, executor: E) -> Result<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playlist_items WHERE playlist = $1")
            .bind(playlist.as_str())
            .fetch_one(executor)
            .await?;

        Ok(count)
    }

    /// Smallest and largest order key, or None for an empty playlist
    pub async fn key_bounds<'e, E>(
        &self,
        playlist: &PlaylistId,
        executor: E,
    ) -> Result<Option<(i64, i64)>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let (min, max): (Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT MIN(order_key), MAX(order_key) FROM playlist_items WHERE playlist = $1",
        )
        .bind(playlist.as_str())
        .fetch_one(executor)
        .await?;

        Ok(min.zip(max))
    }

    /// Number of items whose key falls inside `[start, end]`
    pub async fn count_in_window<'e, E>(
        &self,
        playlist: &PlaylistId,
        start: i64,
        end: i64,
        executor: E,
    ) -> Result<i64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM playlist_items
            WHERE playlist = $1 AND order_key BETWEEN $2 AND $3
            ",
        )
        .bind(playlist.as_str())
        .bind(start)
        .bind(end)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Closest item strictly after `key`
    pub async fn neighbor_after<'e, E>(
        &self,
        playlist: &PlaylistId,
        key: i64,
        executor: E,
    ) -> Result<Option<PlaylistItem>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r"
            SELECT {ITEM_COLUMNS} FROM playlist_items
            WHERE playlist = $1 AND order_key > $2
            ORDER BY order_key ASC
            LIMIT 1
            "
        ))
        .bind(playlist.as_str())
        .bind(key)
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Some(PlaylistItem::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Closest item strictly before `key`
    pub async fn neighbor_before<'e, E>(
        &self,
        playlist: &PlaylistId,
        key: i64,
        executor: E,
    ) -> Result<Option<PlaylistItem>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r"
            SELECT {ITEM_COLUMNS} FROM playlist_items
            WHERE playlist = $1 AND order_key < $2
            ORDER BY order_key DESC
            LIMIT 1
            "
        ))
        .bind(playlist.as_str())
        .bind(key)
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Some(PlaylistItem::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// First item of the playlist in queue order
    pub async fn first_item<'e, E>(
        &self,
        playlist: &PlaylistId,
        executor: E,
    ) -> Result<Option<PlaylistItem>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r"
            SELECT {ITEM_COLUMNS} FROM playlist_items
            WHERE playlist = $1
            ORDER BY order_key ASC
            LIMIT 1
            "
        ))
        .bind(playlist.as_str())
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Some(PlaylistItem::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Last item of the playlist in queue order
    pub async fn last_item<'e, E>(
        &self,
        playlist: &PlaylistId,
        executor: E,
    ) -> Result<Option<PlaylistItem>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r"
            SELECT {ITEM_COLUMNS} FROM playlist_items
            WHERE playlist = $1
            ORDER BY order_key DESC
            LIMIT 1
            "
        ))
        .bind(playlist.as_str())
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Some(PlaylistItem::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Delete items by id, scoped to the playlist
    pub async fn delete<'e, E>(
        &self,
        playlist: &PlaylistId,
        items: &[ItemId],
        executor: E,
    ) -> Result<u64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let ids: Vec<String> = items.iter().map(|id| id.as_str().to_string()).collect();
        let result = sqlx::query("DELETE FROM playlist_items WHERE playlist = $1 AND id = ANY($2)")
            .bind(playlist.as_str())
            .bind(ids)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Exchange the order keys of two items in one statement.
    ///
    /// Relies on the deferred uniqueness of (playlist, order_key): both
    /// rows change before the constraint is checked at commit.
    pub async fn swap_keys<'e, E>(
        &self,
        playlist: &PlaylistId,
        a: &ItemId,
        b: &ItemId,
        key_a: i64,
        key_b: i64,
        executor: E,
    ) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r"
            UPDATE playlist_items
            SET order_key = CASE id WHEN $2 THEN $4 WHEN $3 THEN $5 END
            WHERE playlist = $1 AND id IN ($2, $3)
            ",
        )
        .bind(playlist.as_str())
        .bind(a.as_str())
        .bind(b.as_str())
        .bind(key_b)
        .bind(key_a)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Respace every key in `[start, end]` to a uniform stride in one
    /// statement, reserving `reserve` extra key space immediately after
    /// the item whose old key was `before_key`.
    ///
    /// New key for the item ranked `r` (1-based, by old key):
    /// `start + delta * (r - 1)`, plus `reserve` for every item that sat
    /// after the insertion point.
    pub async fn rewrite_window<'e, E>(
        &self,
        playlist: &PlaylistId,
        start: i64,
        end: i64,
        delta: i64,
        before_key: i64,
        reserve: i64,
        executor: E,
    ) -> Result<u64>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            WITH ranked AS (
                SELECT id, order_key,
                       ROW_NUMBER() OVER (ORDER BY order_key) AS rank
                FROM playlist_items
                WHERE playlist = $1 AND order_key BETWEEN $2 AND $3
            )
            UPDATE playlist_items AS i
            SET order_key = $2 + $4 * (ranked.rank - 1)
                          + CASE WHEN ranked.order_key > $5 THEN $6 ELSE 0 END
            FROM ranked
            WHERE i.id = ranked.id
            ",
        )
        .bind(playlist.as_str())
        .bind(start)
        .bind(end)
        .bind(delta)
        .bind(before_key)
        .bind(reserve)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// One page of the queue joined with media, with a queue-wide
    /// zero-based index per row
    pub async fn list_page(
        &self,
        playlist: &PlaylistId,
        params: PageParams,
    ) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, m.title, m.artist, m.url, m.duration_seconds,
                   ROW_NUMBER() OVER (ORDER BY i.order_key) - 1 AS "index"
            FROM playlist_items i
            JOIN medias m ON m.id = i.media
            WHERE i.playlist = $1
            ORDER BY i.order_key
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(playlist.as_str())
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(QueueEntry::from_row(&row)?))
            .collect()
    }

    /// Total item count using the repository pool
    pub async fn total(&self, playlist: &PlaylistId) -> Result<i64> {
        self.item_count(playlist, &self.pool).await
    }
}
