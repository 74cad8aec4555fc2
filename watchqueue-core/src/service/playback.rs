//! Playback cursor service
//!
//! Moves `playlists.current` under the playlist advisory lock and pushes
//! the new media to the room only after the transaction commits. The skip
//! consensus lives in the hub; this service turns a completed consensus
//! into the same cursor advance a manager would trigger by hand.

use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    models::{AdvanceDirection, ItemId, PlaylistId, PlaylistItem, SocketId},
    repository::{MediaRepository, PlaylistRepository, QueueRepository},
    sync::{MediaChangePayload, RealtimeHub, WsMessage},
    Error, Result,
};

/// Playback cursor service
#[derive(Clone)]
pub struct PlaybackService {
    pool: PgPool,
    playlists: PlaylistRepository,
    queue: QueueRepository,
    medias: MediaRepository,
    hub: RealtimeHub,
}

impl std::fmt::Debug for PlaybackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackService").finish()
    }
}

impl PlaybackService {
    pub fn new(
        pool: PgPool,
        playlists: PlaylistRepository,
        queue: QueueRepository,
        medias: MediaRepository,
        hub: RealtimeHub,
    ) -> Self {
        Self {
            pool,
            playlists,
            queue,
            medias,
            hub,
        }
    }

    /// Step the cursor to the neighboring item, wrapping around at either
    /// end of the queue. Manager-only.
    pub async fn advance(
        &self,
        playlist: &PlaylistId,
        username: &str,
        direction: AdvanceDirection,
    ) -> Result<ItemId> {
        self.playlists.fetch(playlist).await?;
        if !self.playlists.is_manager(playlist, username).await? {
            return Err(Error::PermissionDenied(
                "Only the owner or a manager may control playback".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        self.playlists.lock_for_update(playlist, &mut *tx).await?;
        let target = self.advance_in(&mut tx, playlist, direction).await?;
        let payload = MediaChangePayload::new(
            target.id.clone(),
            self.medias.for_item(&target.id, &mut *tx).await?,
        );
        tx.commit().await?;

        info!(playlist = %playlist, item = %target.id, ?direction, "Playback advanced");
        self.announce_media_change(playlist, payload);

        Ok(target.id)
    }

    /// Jump the cursor to a specific item. Manager-only.
    pub async fn go_to(
        &self,
        playlist: &PlaylistId,
        username: &str,
        item: &ItemId,
    ) -> Result<()> {
        self.playlists.fetch(playlist).await?;
        if !self.playlists.is_manager(playlist, username).await? {
            return Err(Error::PermissionDenied(
                "Only the owner or a manager may control playback".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        self.playlists.lock_for_update(playlist, &mut *tx).await?;

        if !self.queue.exists_in(playlist, item, &mut *tx).await? {
            return Err(Error::NotFound(format!("Item {item} not found")));
        }
        self.playlists
            .set_current_with_executor(playlist, Some(item), &mut *tx)
            .await?;
        let payload =
            MediaChangePayload::new(item.clone(), self.medias.for_item(item, &mut *tx).await?);
        tx.commit().await?;

        info!(playlist = %playlist, item = %item, "Playback jumped");
        self.announce_media_change(playlist, payload);

        Ok(())
    }

    /// Record a skip vote; when every signed-in viewer has voted, advance
    /// exactly once. Returns whether the advance happened.
    ///
    /// The hub clears the vote set the moment consensus completes, before
    /// the advance commits. A failed advance therefore costs the room its
    /// votes and everyone must vote again; accepted as the lesser evil
    /// next to double-advancing on retry.
    pub async fn request_next(&self, playlist: &PlaylistId, username: &str) -> Result<bool> {
        self.playlists.fetch(playlist).await?;

        if !self.hub.request_next(playlist, username) {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        self.playlists.lock_for_update(playlist, &mut *tx).await?;
        let target = self
            .advance_in(&mut tx, playlist, AdvanceDirection::Next)
            .await?;
        let payload = MediaChangePayload::new(
            target.id.clone(),
            self.medias.for_item(&target.id, &mut *tx).await?,
        );
        tx.commit().await?;

        info!(playlist = %playlist, item = %target.id, "Skip consensus advanced playback");
        self.announce_media_change(playlist, payload);

        Ok(true)
    }

    /// Open a viewer connection.
    ///
    /// The returned stream starts with the handshake, followed by a
    /// snapshot of the playing media so late joiners sync immediately.
    pub async fn connect(
        &self,
        playlist: &PlaylistId,
        username: String,
    ) -> Result<(SocketId, mpsc::UnboundedReceiver<WsMessage>)> {
        self.playlists.fetch(playlist).await?;

        let (socket_id, rx) = self.hub.connect(playlist.clone(), username);
        if let Some(payload) = self.now_playing(playlist).await? {
            self.hub.send(&socket_id, WsMessage::MediaChange(payload));
        }

        Ok((socket_id, rx))
    }

    /// Close a viewer connection
    pub fn disconnect(&self, socket_id: &SocketId) {
        self.hub.disconnect(socket_id);
    }

    /// Snapshot of the playing media, if any
    pub async fn now_playing(&self, playlist: &PlaylistId) -> Result<Option<MediaChangePayload>> {
        let Some(current) = self
            .playlists
            .current_with_executor(playlist, &self.pool)
            .await?
        else {
            return Ok(None);
        };

        match self.medias.for_item(&current, &self.pool).await {
            Ok(media) => Ok(Some(MediaChangePayload::new(current, media))),
            // The item can vanish between the two reads
            Err(Error::NotFound(_)) => {
                debug!(playlist = %playlist, "Current item disappeared under snapshot read");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve the advance target and write the cursor, all inside the
    /// caller's transaction.
    ///
    /// With no current item the cursor starts at the queue's first (Next)
    /// or last (Prev) item. An empty queue fails with `NoCurrentMedia`.
    async fn advance_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        playlist: &PlaylistId,
        direction: AdvanceDirection,
    ) -> Result<PlaylistItem> {
        let current = self.playlists.current_with_executor(playlist, &mut **tx).await?;
        let current_item = match current {
            Some(id) => self.queue.get_item(playlist, &id, &mut **tx).await?,
            None => None,
        };

        let target = match (&current_item, direction) {
            (Some(cur), AdvanceDirection::Next) => {
                match self
                    .queue
                    .neighbor_after(playlist, cur.order_key, &mut **tx)
                    .await?
                {
                    Some(next) => Some(next),
                    // Cyclic queue: past the tail comes the head
                    None => self.queue.first_item(playlist, &mut **tx).await?,
                }
            }
            (Some(cur), AdvanceDirection::Prev) => {
                match self
                    .queue
                    .neighbor_before(playlist, cur.order_key, &mut **tx)
                    .await?
                {
                    Some(prev) => Some(prev),
                    None => self.queue.last_item(playlist, &mut **tx).await?,
                }
            }
            (None, AdvanceDirection::Next) => self.queue.first_item(playlist, &mut **tx).await?,
            (None, AdvanceDirection::Prev) => self.queue.last_item(playlist, &mut **tx).await?,
        };

        let target = target.ok_or(Error::NoCurrentMedia)?;
        self.playlists
            .set_current_with_executor(playlist, Some(&target.id), &mut **tx)
            .await?;

        Ok(target)
    }

    /// Commit already happened; stale votes must not skip the new media
    fn announce_media_change(&self, playlist: &PlaylistId, payload: MediaChangePayload) {
        self.hub.clear_votes(playlist);
        self.hub.broadcast(playlist, &WsMessage::MediaChange(payload));
    }
}
