//! In-memory hub routing messages to connected viewers
//!
//! One room per playlist. Rooms exist only while someone is connected;
//! the skip vote set lives with the room and dies with it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{PlaylistId, SocketId};

use super::message::WsMessage;

/// Message sender for a viewer connection
pub type MessageSender = mpsc::UnboundedSender<WsMessage>;

/// Viewer sockets of one playlist, grouped by username.
///
/// Anonymous viewers connect under an empty username: they receive every
/// broadcast but never count toward skip consensus.
#[derive(Default)]
struct Room {
    viewers: HashMap<String, HashMap<SocketId, MessageSender>>,
    pending_next: HashSet<String>,
}

impl Room {
    fn socket_count(&self) -> usize {
        self.viewers.values().map(HashMap::len).sum()
    }

    /// All viewers with a username have voted
    fn next_is_unanimous(&self) -> bool {
        let mut named = self
            .viewers
            .keys()
            .filter(|username| !username.is_empty())
            .peekable();
        named.peek().is_some() && named.all(|username| self.pending_next.contains(username))
    }
}

struct Connection {
    playlist: PlaylistId,
    username: String,
    sender: MessageSender,
}

/// Routes playlist events to connected viewers on this node
#[derive(Clone)]
pub struct RealtimeHub {
    rooms: Arc<DashMap<PlaylistId, Room>>,
    sockets: Arc<DashMap<SocketId, Connection>>,
}

impl RealtimeHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            sockets: Arc::new(DashMap::new()),
        }
    }

    /// Register a viewer and hand back its message stream.
    ///
    /// The handshake carrying the socket id is already queued on the
    /// returned receiver, ahead of any broadcast.
    pub fn connect(
        &self,
        playlist: PlaylistId,
        username: String,
    ) -> (SocketId, mpsc::UnboundedReceiver<WsMessage>) {
        let socket_id = SocketId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        // Receiver is still in scope, this cannot fail
        let _ = tx.send(WsMessage::Handshake {
            socket_id: socket_id.clone(),
        });

        self.rooms
            .entry(playlist.clone())
            .or_default()
            .viewers
            .entry(username.clone())
            .or_default()
            .insert(socket_id.clone(), tx.clone());

        self.sockets.insert(
            socket_id.clone(),
            Connection {
                playlist: playlist.clone(),
                username: username.clone(),
                sender: tx,
            },
        );

        info!(
            playlist = %playlist,
            username = %username,
            socket_id = %socket_id,
            "Viewer connected"
        );

        (socket_id, rx)
    }

    /// Drop a viewer connection.
    ///
    /// When this was the user's last socket in the room their pending
    /// skip vote is withdrawn; when the room empties it is removed.
    pub fn disconnect(&self, socket_id: &SocketId) {
        let Some((_, conn)) = self.sockets.remove(socket_id) else {
            warn!(socket_id = %socket_id, "Disconnect for unknown socket");
            return;
        };

        if let Some(mut room) = self.rooms.get_mut(&conn.playlist) {
            if let Some(sockets) = room.viewers.get_mut(&conn.username) {
                sockets.remove(socket_id);
                if sockets.is_empty() {
                    room.viewers.remove(&conn.username);
                    room.pending_next.remove(&conn.username);
                }
            }

            if room.viewers.is_empty() {
                drop(room); // Drop the RefMut before removing
                self.rooms.remove(&conn.playlist);
                debug!(playlist = %conn.playlist, "Room has no more viewers, removed");
            }
        }

        info!(
            playlist = %conn.playlist,
            username = %conn.username,
            socket_id = %socket_id,
            "Viewer disconnected"
        );
    }

    /// Send a message to every viewer of a playlist
    pub fn broadcast(&self, playlist: &PlaylistId, message: &WsMessage) -> usize {
        let mut sent_count = 0;
        let mut failed_sockets = Vec::new();

        if let Some(room) = self.rooms.get(playlist) {
            for (username, sockets) in &room.viewers {
                for (socket_id, sender) in sockets {
                    if sender.send(message.clone()).is_ok() {
                        sent_count += 1;
                    } else {
                        warn!(
                            playlist = %playlist,
                            username = %username,
                            socket_id = %socket_id,
                            kind = message.kind(),
                            "Viewer channel closed, marking for cleanup"
                        );
                        failed_sockets.push(socket_id.clone());
                    }
                }
            }
        }

        for socket_id in failed_sockets {
            self.disconnect(&socket_id);
        }

        if sent_count > 0 {
            debug!(
                playlist = %playlist,
                sent_count,
                kind = message.kind(),
                "Broadcast complete"
            );
        }

        sent_count
    }

    /// Send a message to one socket; a stale id is a logged no-op
    pub fn send(&self, socket_id: &SocketId, message: WsMessage) {
        let Some(conn) = self.sockets.get(socket_id) else {
            debug!(socket_id = %socket_id, kind = message.kind(), "Send to stale socket dropped");
            return;
        };

        if conn.sender.send(message).is_err() {
            drop(conn);
            self.disconnect(socket_id);
        }
    }

    /// Record a skip vote and report whether it completed the consensus.
    ///
    /// Returns true exactly when every signed-in viewer of the playlist
    /// has a pending vote; the vote set is cleared in the same step so
    /// the caller advances playback exactly once.
    pub fn request_next(&self, playlist: &PlaylistId, username: &str) -> bool {
        if username.is_empty() {
            return false;
        }

        let Some(mut room) = self.rooms.get_mut(playlist) else {
            return false;
        };
        if !room.viewers.contains_key(username) {
            return false;
        }

        room.pending_next.insert(username.to_string());
        debug!(
            playlist = %playlist,
            username = %username,
            votes = room.pending_next.len(),
            "Skip vote recorded"
        );

        if room.next_is_unanimous() {
            room.pending_next.clear();
            return true;
        }
        false
    }

    /// Forget all pending skip votes for a playlist.
    ///
    /// Called whenever the current media changes by other means, so old
    /// votes never skip the new media.
    pub fn clear_votes(&self, playlist: &PlaylistId) {
        if let Some(mut room) = self.rooms.get_mut(playlist) {
            room.pending_next.clear();
        }
    }

    /// Number of open sockets in a room
    #[must_use]
    pub fn viewer_count(&self, playlist: &PlaylistId) -> usize {
        self.rooms
            .get(playlist)
            .map(|room| room.socket_count())
            .unwrap_or(0)
    }

    /// Number of rooms with at least one viewer
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total open sockets across all rooms
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.sockets.len()
    }

    /// Drop every connection; client streams end when the senders go
    pub fn shutdown(&self) {
        let count = self.sockets.len();
        self.sockets.clear();
        self.rooms.clear();
        info!(connections = count, "Realtime hub shut down");
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::message::RoomEvent;

    fn playlist() -> PlaylistId {
        PlaylistId::from_string("testplaylist".to_string())
    }

    #[tokio::test]
    async fn test_handshake_arrives_first() {
        let hub = RealtimeHub::new();
        let (socket_id, mut rx) = hub.connect(playlist(), "alice".to_string());

        hub.broadcast(
            &playlist(),
            &WsMessage::Event {
                event: RoomEvent::RefreshPlaylist,
            },
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first,
            WsMessage::Handshake {
                socket_id: socket_id.clone()
            }
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind(), "event");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_viewers() {
        let hub = RealtimeHub::new();
        let (_, mut rx1) = hub.connect(playlist(), "alice".to_string());
        let (_, mut rx2) = hub.connect(playlist(), String::new());
        rx1.recv().await.unwrap(); // handshakes
        rx2.recv().await.unwrap();

        let sent = hub.broadcast(
            &playlist(),
            &WsMessage::Event {
                event: RoomEvent::RefreshManagers,
            },
        );
        assert_eq!(sent, 2);
        assert_eq!(rx1.recv().await.unwrap().kind(), "event");
        assert_eq!(rx2.recv().await.unwrap().kind(), "event");
    }

    #[tokio::test]
    async fn test_send_to_stale_socket_is_noop() {
        let hub = RealtimeHub::new();
        let (socket_id, rx) = hub.connect(playlist(), "alice".to_string());
        drop(rx);
        hub.disconnect(&socket_id);

        // Must not panic or create state
        hub.send(&socket_id, WsMessage::Swap("hello".to_string()));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_closed_channels() {
        let hub = RealtimeHub::new();
        let (_, rx1) = hub.connect(playlist(), "alice".to_string());
        let (_, mut rx2) = hub.connect(playlist(), "bob".to_string());
        drop(rx1);
        rx2.recv().await.unwrap(); // handshake

        let sent = hub.broadcast(
            &playlist(),
            &WsMessage::Event {
                event: RoomEvent::RefreshPlaylist,
            },
        );
        assert_eq!(sent, 1);
        assert_eq!(hub.viewer_count(&playlist()), 1);
    }

    #[tokio::test]
    async fn test_skip_consensus_requires_all_named_viewers() {
        let hub = RealtimeHub::new();
        let (_a, _rx_a) = hub.connect(playlist(), "alice".to_string());
        let (_b, _rx_b) = hub.connect(playlist(), "bob".to_string());

        assert!(!hub.request_next(&playlist(), "alice"));
        assert!(hub.request_next(&playlist(), "bob"));

        // Votes were cleared on completion
        assert!(!hub.request_next(&playlist(), "alice"));
    }

    #[tokio::test]
    async fn test_anonymous_viewers_do_not_block_consensus() {
        let hub = RealtimeHub::new();
        let (_a, _rx_a) = hub.connect(playlist(), "alice".to_string());
        let (_anon, _rx_anon) = hub.connect(playlist(), String::new());

        // Anonymous votes are rejected outright
        assert!(!hub.request_next(&playlist(), ""));
        // Single named viewer completes the consensus alone
        assert!(hub.request_next(&playlist(), "alice"));
    }

    #[tokio::test]
    async fn test_vote_from_unconnected_user_rejected() {
        let hub = RealtimeHub::new();
        let (_a, _rx_a) = hub.connect(playlist(), "alice".to_string());

        assert!(!hub.request_next(&playlist(), "mallory"));
        assert!(!hub.request_next(&PlaylistId::from_string("other".to_string()), "alice"));
    }

    #[tokio::test]
    async fn test_disconnect_withdraws_vote_and_empties_room() {
        let hub = RealtimeHub::new();
        let (sock_a, _rx_a) = hub.connect(playlist(), "alice".to_string());
        let (sock_b, _rx_b) = hub.connect(playlist(), "bob".to_string());

        assert!(!hub.request_next(&playlist(), "alice"));
        hub.disconnect(&sock_a);

        // Alice's vote is gone; bob alone must still vote
        assert!(hub.request_next(&playlist(), "bob"));

        hub.disconnect(&sock_b);
        assert_eq!(hub.room_count(), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_second_socket_keeps_user_in_room() {
        let hub = RealtimeHub::new();
        let (sock1, _rx1) = hub.connect(playlist(), "alice".to_string());
        let (_sock2, _rx2) = hub.connect(playlist(), "alice".to_string());
        assert_eq!(hub.viewer_count(&playlist()), 2);

        hub.disconnect(&sock1);
        // Still connected through the second socket
        assert_eq!(hub.viewer_count(&playlist()), 1);
        assert!(hub.request_next(&playlist(), "alice"));
    }

    #[tokio::test]
    async fn test_clear_votes() {
        let hub = RealtimeHub::new();
        let (_a, _rx_a) = hub.connect(playlist(), "alice".to_string());
        let (_b, _rx_b) = hub.connect(playlist(), "bob".to_string());

        assert!(!hub.request_next(&playlist(), "alice"));
        hub.clear_votes(&playlist());

        // Alice must vote again
        assert!(!hub.request_next(&playlist(), "bob"));
        assert!(hub.request_next(&playlist(), "alice"));
    }
}
