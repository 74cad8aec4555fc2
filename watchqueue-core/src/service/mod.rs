//! Business logic services
//!
//! Services own the transaction boundaries: every mutation runs in one
//! transaction holding the playlist advisory lock, and viewers are
//! notified only after the commit succeeds.

pub mod playback;
pub mod playlist;
pub mod queue;

pub use playback::PlaybackService;
pub use playlist::PlaylistService;
pub use queue::QueueService;
