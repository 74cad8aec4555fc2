//! Realtime viewer sessions
//!
//! The hub routes messages between playlist services and connected
//! viewers on a single node; persistence stays in the repositories.

pub mod hub;
pub mod message;

pub use hub::RealtimeHub;
pub use message::{MediaChangePayload, RoomEvent, WsMessage};
