//! Media repository, keyed by canonical URL

use sqlx::{FromRow, PgPool};

use crate::{
    models::{ItemId, Media, MediaId},
    Error, Result,
};

const MEDIA_COLUMNS: &str = "id, url, title, artist, duration_seconds, aspect_ratio, kind";

/// Media repository
#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get media by ID
    pub async fn get(&self, id: &MediaId) -> Result<Media> {
        let row = sqlx::query(&format!("SELECT {MEDIA_COLUMNS} FROM medias WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Media::from_row(&row)?),
            None => Err(Error::NotFound(format!("Media {id} not found"))),
        }
    }

    /// Insert new media, or refresh metadata when the URL already exists.
    ///
    /// Concurrent adds of the same URL from different playlists race past
    /// the per-playlist lock; the upsert keeps them converging on one row.
    pub async fn upsert<'e, E>(&self, media: &Media, executor: E) -> Result<Media>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            r"
            INSERT INTO medias (id, url, title, artist, duration_seconds, aspect_ratio, kind)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (url) DO UPDATE
            SET title = EXCLUDED.title,
                artist = EXCLUDED.artist,
                duration_seconds = EXCLUDED.duration_seconds,
                aspect_ratio = EXCLUDED.aspect_ratio,
                kind = EXCLUDED.kind
            RETURNING {MEDIA_COLUMNS}
            "
        ))
        .bind(media.id.as_str())
        .bind(&media.url)
        .bind(&media.title)
        .bind(&media.artist)
        .bind(media.duration_seconds)
        .bind(media.aspect_ratio.as_str())
        .bind(media.kind.as_str())
        .fetch_one(executor)
        .await?;

        Ok(Media::from_row(&row)?)
    }

    /// Media backing a queue item
    pub async fn for_item<'e, E>(&self, item: &ItemId, executor: E) -> Result<Media>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            r"
            SELECT m.id, m.url, m.title, m.artist, m.duration_seconds, m.aspect_ratio, m.kind
            FROM medias m
            JOIN playlist_items i ON i.media = m.id
            WHERE i.id = $1
            ",
        )
        .bind(item.as_str())
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(Media::from_row(&row)?),
            None => Err(Error::NotFound(format!("Item {item} not found"))),
        }
    }
}
