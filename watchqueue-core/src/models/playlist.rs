use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::{ItemId, PlaylistId};
use crate::Error;

/// A shared watch queue: one room of viewers, one cursor.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub owner_username: String,
    /// Item the room is currently playing, if any
    pub current: Option<ItemId>,
    pub created_at: DateTime<Utc>,
}

impl Playlist {
    /// New playlist with a fresh id and no current item
    #[must_use]
    pub fn new(name: String, owner_username: String) -> Self {
        Self {
            id: PlaylistId::new(),
            name,
            owner_username,
            current: None,
            created_at: Utc::now(),
        }
    }
}

/// Where newly added items land in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddPosition {
    AddToStart,
    AddToEnd,
    QueueNext,
}

impl FromStr for AddPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add-to-start" => Ok(Self::AddToStart),
            "add-to-end" => Ok(Self::AddToEnd),
            "queue-next" => Ok(Self::QueueNext),
            other => Err(Error::InvalidInput(format!("Invalid add position: {other}"))),
        }
    }
}

impl std::fmt::Display for AddPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddToStart => write!(f, "add-to-start"),
            Self::AddToEnd => write!(f, "add-to-end"),
            Self::QueueNext => write!(f, "queue-next"),
        }
    }
}

/// Direction of a batch reorder; `Up` moves toward smaller order keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

impl FromStr for MoveDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(Error::InvalidInput(format!("Invalid move direction: {other}"))),
        }
    }
}

/// Direction of a cursor step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceDirection {
    Next,
    Prev,
}

impl FromStr for AdvanceDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            other => Err(Error::InvalidInput(format!(
                "Invalid advance direction: {other}"
            ))),
        }
    }
}

/// Search scope when listing playlists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistFilter {
    All,
    Owned,
    Managed,
}

impl FromStr for PlaylistFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "owned" => Ok(Self::Owned),
            "managed" => Ok(Self::Managed),
            other => Err(Error::InvalidInput(format!("Invalid filter: {other}"))),
        }
    }
}

/// Search result row for playlist listings
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistSummary {
    pub id: PlaylistId,
    pub name: String,
    pub owner_username: String,
    pub created_at: DateTime<Utc>,
    pub item_count: i64,
    pub total_duration_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_position_parse() {
        assert_eq!(
            "queue-next".parse::<AddPosition>().unwrap(),
            AddPosition::QueueNext
        );
        assert_eq!(
            "add-to-end".parse::<AddPosition>().unwrap(),
            AddPosition::AddToEnd
        );
        assert!(matches!(
            "somewhere".parse::<AddPosition>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_add_position_display_round_trip() {
        for pos in [
            AddPosition::AddToStart,
            AddPosition::AddToEnd,
            AddPosition::QueueNext,
        ] {
            assert_eq!(pos.to_string().parse::<AddPosition>().unwrap(), pos);
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("up".parse::<MoveDirection>().unwrap(), MoveDirection::Up);
        assert_eq!(
            "prev".parse::<AdvanceDirection>().unwrap(),
            AdvanceDirection::Prev
        );
        assert!("sideways".parse::<MoveDirection>().is_err());
    }
}
