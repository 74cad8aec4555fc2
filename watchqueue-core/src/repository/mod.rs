//! Database access layer
//!
//! Repositories hold a [`sqlx::PgPool`] for standalone reads and expose
//! `*_with_executor` variants for operations that must share a transaction.

pub mod media;
pub mod playlist;
pub mod queue;

pub use media::MediaRepository;
pub use playlist::PlaylistRepository;
pub use queue::QueueRepository;
