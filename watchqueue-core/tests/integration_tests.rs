//! Integration tests for watchqueue-core
//!
//! These tests verify the realtime room layer end to end without a
//! database: connection lifecycle, message ordering, and skip consensus.
//!
//! Run with: cargo test --test integration_tests

use watchqueue_core::{
    models::{PageParams, PlaylistId},
    sync::{RealtimeHub, RoomEvent, WsMessage},
};

fn playlist() -> PlaylistId {
    PlaylistId::from_string("integration01".to_string())
}

#[tokio::test]
async fn test_viewer_session_lifecycle() {
    let hub = RealtimeHub::new();

    let (sock_a, mut rx_a) = hub.connect(playlist(), "alice".to_string());
    let (sock_b, mut rx_b) = hub.connect(playlist(), "bob".to_string());
    assert_eq!(hub.viewer_count(&playlist()), 2);

    // Each stream opens with its own handshake
    assert_eq!(
        rx_a.recv().await.unwrap(),
        WsMessage::Handshake {
            socket_id: sock_a.clone()
        }
    );
    assert_eq!(
        rx_b.recv().await.unwrap(),
        WsMessage::Handshake {
            socket_id: sock_b.clone()
        }
    );

    // A broadcast reaches both, a targeted send only one
    hub.broadcast(
        &playlist(),
        &WsMessage::Event {
            event: RoomEvent::RefreshPlaylist,
        },
    );
    hub.send(&sock_a, WsMessage::Swap("Added 1 item(s) to the queue".to_string()));

    assert_eq!(rx_a.recv().await.unwrap().kind(), "event");
    assert_eq!(rx_a.recv().await.unwrap().kind(), "swap");
    assert_eq!(rx_b.recv().await.unwrap().kind(), "event");

    hub.disconnect(&sock_a);
    hub.disconnect(&sock_b);
    assert_eq!(hub.room_count(), 0);

    // Streams end once their senders are gone
    assert!(rx_a.recv().await.is_none());
    assert!(rx_b.recv().await.is_none());
}

#[tokio::test]
async fn test_skip_consensus_over_three_viewers() {
    let hub = RealtimeHub::new();
    let (_s1, _rx1) = hub.connect(playlist(), "u1".to_string());
    let (_s2, _rx2) = hub.connect(playlist(), "u2".to_string());
    let (_s3, _rx3) = hub.connect(playlist(), "u3".to_string());

    assert!(!hub.request_next(&playlist(), "u1"));
    assert!(!hub.request_next(&playlist(), "u2"));
    // Re-voting changes nothing
    assert!(!hub.request_next(&playlist(), "u2"));
    // The last voter completes the consensus exactly once
    assert!(hub.request_next(&playlist(), "u3"));
    assert!(!hub.request_next(&playlist(), "u3"));
}

#[tokio::test]
async fn test_room_removed_when_last_viewer_leaves() {
    let hub = RealtimeHub::new();
    let (sock, _rx) = hub.connect(playlist(), "alice".to_string());
    assert_eq!(hub.room_count(), 1);

    hub.disconnect(&sock);
    assert_eq!(hub.room_count(), 0);
    assert_eq!(hub.viewer_count(&playlist()), 0);
}

#[tokio::test]
async fn test_shutdown_closes_all_streams() {
    let hub = RealtimeHub::new();
    let (_a, mut rx_a) = hub.connect(playlist(), "alice".to_string());
    let (_b, mut rx_b) = hub.connect(PlaylistId::from_string("other0000000".to_string()), String::new());

    hub.shutdown();
    assert_eq!(hub.connection_count(), 0);

    // Drain handshakes, then the streams are closed
    assert_eq!(rx_a.recv().await.unwrap().kind(), "handshake");
    assert!(rx_a.recv().await.is_none());
    assert_eq!(rx_b.recv().await.unwrap().kind(), "handshake");
    assert!(rx_b.recv().await.is_none());
}

#[test]
fn test_tail_paging_defaults() {
    // Queues are watched from the tail: page 0 resolves to the last page
    let params = PageParams::last_page(35, Some(10));
    assert_eq!(params.page, 4);
    assert_eq!(params.offset(), 30);
    assert_eq!(params.limit(), 10);

    let params = PageParams::last_page(0, None);
    assert_eq!(params.page, 1);
    assert_eq!(params.offset(), 0);
}
