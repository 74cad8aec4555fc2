use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ItemId, MediaId, PlaylistId};

/// One queue entry. `order_key` is the only mutable field: it sorts the
/// queue without ever moving rows, and is rewritten only by the rebalance
/// engine or a move swap.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistItem {
    pub id: ItemId,
    pub playlist: PlaylistId,
    pub media: MediaId,
    pub order_key: i64,
    pub added_at: DateTime<Utc>,
}

/// Display row for queue listings (item joined with its media)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueEntry {
    pub id: ItemId,
    pub title: String,
    pub artist: String,
    pub url: String,
    pub duration_seconds: i32,
    /// Zero-based position in the full queue, independent of paging
    #[sqlx(default)]
    pub index: i64,
}
