//! Playlist lifecycle and roster service
//!
//! Create/rename/delete are owner-gated; the manager roster extends queue
//! and playback control to other signed-in users.

use tracing::info;

use crate::{
    models::{Page, PageParams, Playlist, PlaylistFilter, PlaylistId, PlaylistSummary},
    repository::PlaylistRepository,
    sync::{RealtimeHub, RoomEvent, WsMessage},
    Error, Result,
};

/// Longest accepted playlist name
const MAX_NAME_LEN: usize = 100;

/// Playlist lifecycle service
#[derive(Clone)]
pub struct PlaylistService {
    playlists: PlaylistRepository,
    hub: RealtimeHub,
}

impl std::fmt::Debug for PlaylistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistService").finish()
    }
}

impl PlaylistService {
    pub fn new(playlists: PlaylistRepository, hub: RealtimeHub) -> Self {
        Self { playlists, hub }
    }

    /// Create a playlist owned by `username`
    pub async fn create(&self, name: &str, username: &str) -> Result<Playlist> {
        if username.is_empty() {
            return Err(Error::PermissionDenied(
                "Sign in to create a playlist".to_string(),
            ));
        }
        let name = validated_name(name)?;

        let playlist = self
            .playlists
            .create(&Playlist::new(name, username.to_string()))
            .await?;

        info!(playlist = %playlist.id, owner = %username, "Playlist created");
        Ok(playlist)
    }

    /// Rename a playlist. Owner-only.
    pub async fn rename(&self, id: &PlaylistId, username: &str, name: &str) -> Result<()> {
        self.require_owner(id, username).await?;
        let name = validated_name(name)?;

        self.playlists.rename(id, &name).await?;
        self.hub.broadcast(
            id,
            &WsMessage::Event {
                event: RoomEvent::RefreshPlaylist,
            },
        );
        Ok(())
    }

    /// Delete a playlist with its items and roster. Owner-only.
    pub async fn delete(&self, id: &PlaylistId, username: &str) -> Result<()> {
        self.require_owner(id, username).await?;

        if !self.playlists.delete(id).await? {
            return Err(Error::NotFound(format!("Playlist {id} not found")));
        }

        info!(playlist = %id, "Playlist deleted");
        // Connected viewers reload, find the playlist gone and leave
        self.hub.broadcast(
            id,
            &WsMessage::Event {
                event: RoomEvent::RefreshPlaylist,
            },
        );
        Ok(())
    }

    /// Search playlists by name or owner substring
    pub async fn search(
        &self,
        query: &str,
        filter: PlaylistFilter,
        username: &str,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<PlaylistSummary>> {
        if username.is_empty() && filter != PlaylistFilter::All {
            return Err(Error::PermissionDenied(
                "Sign in to filter by your playlists".to_string(),
            ));
        }

        self.playlists
            .search(query, filter, username, PageParams::new(page, page_size))
            .await
    }

    /// Manager roster, owner excluded
    pub async fn managers(&self, id: &PlaylistId) -> Result<Vec<String>> {
        self.playlists.fetch(id).await?;
        self.playlists.managers(id).await
    }

    /// Put a user on the manager roster. Owner-only.
    pub async fn add_manager(&self, id: &PlaylistId, username: &str, manager: &str) -> Result<()> {
        self.require_owner(id, username).await?;
        if manager.is_empty() {
            return Err(Error::InvalidInput("Manager name must not be empty".to_string()));
        }
        if manager == username {
            return Err(Error::InvalidInput(
                "The owner already manages this playlist".to_string(),
            ));
        }

        if !self.playlists.add_manager(id, manager).await? {
            return Err(Error::InvalidInput(format!(
                "{manager} is already a manager"
            )));
        }

        info!(playlist = %id, manager = %manager, "Manager added");
        self.hub.broadcast(
            id,
            &WsMessage::Event {
                event: RoomEvent::RefreshManagers,
            },
        );
        Ok(())
    }

    /// Take a user off the manager roster. Owner-only.
    pub async fn remove_manager(
        &self,
        id: &PlaylistId,
        username: &str,
        manager: &str,
    ) -> Result<()> {
        self.require_owner(id, username).await?;

        if !self.playlists.remove_manager(id, manager).await? {
            return Err(Error::NotFound(format!("{manager} is not a manager")));
        }

        info!(playlist = %id, manager = %manager, "Manager removed");
        self.hub.broadcast(
            id,
            &WsMessage::Event {
                event: RoomEvent::RefreshManagers,
            },
        );
        Ok(())
    }

    async fn require_owner(&self, id: &PlaylistId, username: &str) -> Result<()> {
        self.playlists.fetch(id).await?;
        if !self.playlists.is_owner(id, username).await? {
            return Err(Error::PermissionDenied(
                "Only the owner may do this".to_string(),
            ));
        }
        Ok(())
    }
}

fn validated_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Playlist name must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Playlist name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert_eq!(validated_name("  Movie night  ").unwrap(), "Movie night");
        assert!(validated_name("   ").is_err());
        assert!(validated_name(&"x".repeat(101)).is_err());
        assert!(validated_name(&"x".repeat(100)).is_ok());
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_only_owner_manages_roster() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::PgPool::connect(&url).await.expect("connect to database");
        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .expect("run migrations");
        let service = PlaylistService::new(PlaylistRepository::new(pool), RealtimeHub::new());

        let playlist = service.create("fixture", "owner").await.unwrap();
        service
            .add_manager(&playlist.id, "owner", "deputy")
            .await
            .unwrap();
        assert_eq!(service.managers(&playlist.id).await.unwrap(), ["deputy"]);

        // A manager is not the owner; the roster stays out of reach
        let err = service
            .add_manager(&playlist.id, "deputy", "friend")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let err = service
            .remove_manager(&playlist.id, "deputy", "deputy")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }
}
