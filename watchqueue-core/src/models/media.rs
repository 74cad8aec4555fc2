use serde::{Deserialize, Serialize};

use super::id::MediaId;

/// Resolved media metadata, deduplicated by canonical URL.
///
/// `kind` and `aspect_ratio` come straight from the resolving provider and
/// are forwarded to players untouched; the core never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: MediaId,
    pub url: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: i32,
    pub aspect_ratio: String,
    pub kind: String,
}

/// Metadata returned by the external media collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub title: String,
    pub artist: String,
    pub duration_seconds: i32,
    pub aspect_ratio: String,
    pub kind: String,
}

impl Media {
    /// Materialize a freshly resolved media under a new id
    #[must_use]
    pub fn from_resolved(url: String, resolved: ResolvedMedia) -> Self {
        Self {
            id: MediaId::new(),
            url,
            title: resolved.title,
            artist: resolved.artist,
            duration_seconds: resolved.duration_seconds,
            aspect_ratio: resolved.aspect_ratio,
            kind: resolved.kind,
        }
    }
}
