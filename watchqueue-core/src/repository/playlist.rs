//! Playlist repository for database operations

use sqlx::{FromRow, PgPool};

use crate::{
    models::{ItemId, Page, PageParams, Playlist, PlaylistFilter, PlaylistId, PlaylistSummary},
    Error, Result,
};

const PLAYLIST_COLUMNS: &str = "id, name, owner_username, current, created_at";

/// Playlist repository
#[derive(Clone)]
pub struct PlaylistRepository {
    pool: PgPool,
}

impl PlaylistRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Serialize all queue writers for one playlist.
    ///
    /// The lock is transaction-scoped and released automatically at
    /// commit or rollback.
    pub async fn lock_for_update<'e, E>(&self, id: &PlaylistId, executor: E) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(id.as_str())
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Create a new playlist
    pub async fn create(&self, playlist: &Playlist) -> Result<Playlist> {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO playlists (id, name, owner_username)
            VALUES ($1, $2, $3)
            RETURNING {PLAYLIST_COLUMNS}
            "
        ))
        .bind(playlist.id.as_str())
        .bind(&playlist.name)
        .bind(&playlist.owner_username)
        .fetch_one(&self.pool)
        .await?;

        Ok(Playlist::from_row(&row)?)
    }

    /// Get playlist by ID
    pub async fn get_by_id(&self, id: &PlaylistId) -> Result<Option<Playlist>> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Playlist::from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Get playlist by ID, failing when it does not exist
    pub async fn fetch(&self, id: &PlaylistId) -> Result<Playlist> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Playlist {id} not found")))
    }

    /// Whether `username` owns the playlist
    pub async fn is_owner(&self, id: &PlaylistId, username: &str) -> Result<bool> {
        let owns: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM playlists WHERE id = $1 AND owner_username = $2)",
        )
        .bind(id.as_str())
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(owns)
    }

    /// Whether `username` may mutate the playlist (owner or roster manager)
    pub async fn is_manager(&self, id: &PlaylistId, username: &str) -> Result<bool> {
        let manages: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS(SELECT 1 FROM playlists WHERE id = $1 AND owner_username = $2)
                OR EXISTS(SELECT 1 FROM playlist_managers WHERE playlist = $1 AND username = $2)
            ",
        )
        .bind(id.as_str())
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(manages)
    }

    /// Manager roster, owner excluded, alphabetical
    pub async fn managers(&self, id: &PlaylistId) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT username FROM playlist_managers WHERE playlist = $1 ORDER BY username",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    /// Add a manager; returns false when already on the roster
    pub async fn add_manager(&self, id: &PlaylistId, username: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO playlist_managers (playlist, username)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(id.as_str())
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a manager; returns false when not on the roster
    pub async fn remove_manager(&self, id: &PlaylistId, username: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM playlist_managers WHERE playlist = $1 AND username = $2")
                .bind(id.as_str())
                .bind(username)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Currently playing item inside a transaction
    pub async fn current_with_executor<'e, E>(
        &self,
        id: &PlaylistId,
        executor: E,
    ) -> Result<Option<ItemId>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let current: Option<Option<ItemId>> =
            sqlx::query_scalar("SELECT current FROM playlists WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(executor)
                .await?;

        match current {
            Some(current) => Ok(current),
            None => Err(Error::NotFound(format!("Playlist {id} not found"))),
        }
    }

    /// Point the playlist at a new current item (or none)
    pub async fn set_current_with_executor<'e, E>(
        &self,
        id: &PlaylistId,
        current: Option<&ItemId>,
        executor: E,
    ) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("UPDATE playlists SET current = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(current.map(ItemId::as_str))
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Rename a playlist
    pub async fn rename(&self, id: &PlaylistId, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE playlists SET name = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Playlist {id} not found")));
        }
        Ok(())
    }

    /// Delete playlist (cascades to items and managers)
    pub async fn delete(&self, id: &PlaylistId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playlists WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Search playlists by name or owner, newest first.
    ///
    /// The summary aggregates item count and total runtime so listings
    /// never fan out into per-playlist queries.
    pub async fn search(
        &self,
        query: &str,
        filter: PlaylistFilter,
        username: &str,
        params: PageParams,
    ) -> Result<Page<PlaylistSummary>> {
        // Every branch references $2 so the bind list stays uniform
        let scope = match filter {
            PlaylistFilter::All => "$2::TEXT IS NOT NULL",
            PlaylistFilter::Owned => "p.owner_username = $2",
            PlaylistFilter::Managed => {
                r"(p.owner_username = $2
                   OR EXISTS(SELECT 1 FROM playlist_managers pm
                             WHERE pm.playlist = p.id AND pm.username = $2))"
            }
        };
        let pattern = format!("%{}%", query.trim());

        let total: i64 = sqlx::query_scalar(&format!(
            r"
            SELECT COUNT(*)
            FROM playlists p
            WHERE (p.name ILIKE $1 OR p.owner_username ILIKE $1) AND {scope}
            "
        ))
        .bind(&pattern)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r"
            SELECT p.id, p.name, p.owner_username, p.created_at,
                   COUNT(i.id) AS item_count,
                   COALESCE(SUM(m.duration_seconds), 0)::BIGINT AS total_duration_seconds
            FROM playlists p
            LEFT JOIN playlist_items i ON i.playlist = p.id
            LEFT JOIN medias m ON m.id = i.media
            WHERE (p.name ILIKE $1 OR p.owner_username ILIKE $1) AND {scope}
            GROUP BY p.id, p.name, p.owner_username, p.created_at
            ORDER BY p.created_at DESC, p.id
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(&pattern)
        .bind(username)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| Ok(PlaylistSummary::from_row(&row)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, total.max(0) as u64, params))
    }
}
