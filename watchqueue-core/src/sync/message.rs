//! Wire messages pushed to connected viewers

use serde::{Deserialize, Serialize};

use crate::models::{ItemId, Media, SocketId};

/// Room-level notification telling clients which view to reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomEvent {
    RefreshPlaylist,
    RefreshManagers,
}

/// Display payload sent when the current media changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChangePayload {
    pub item_id: ItemId,
    pub url: String,
    pub title: String,
    pub artist: String,
    pub duration_seconds: i32,
    pub aspect_ratio: String,
    pub kind: String,
}

impl MediaChangePayload {
    #[must_use]
    pub fn new(item_id: ItemId, media: Media) -> Self {
        Self {
            item_id,
            url: media.url,
            title: media.title,
            artist: media.artist,
            duration_seconds: media.duration_seconds,
            aspect_ratio: media.aspect_ratio,
            kind: media.kind,
        }
    }
}

/// Message pushed over a viewer connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum WsMessage {
    /// First message on every connection: the socket's own id
    Handshake { socket_id: SocketId },
    /// Room-wide reload hint
    Event { event: RoomEvent },
    /// The playing media changed
    MediaChange(MediaChangePayload),
    /// Toast text for one specific viewer
    Swap(String),
}

impl WsMessage {
    /// Message kind for logging
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Handshake { .. } => "handshake",
            Self::Event { .. } => "event",
            Self::MediaChange(_) => "media-change",
            Self::Swap(_) => "swap",
        }
    }
}
