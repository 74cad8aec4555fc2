pub mod id;
pub mod item;
pub mod media;
pub mod pagination;
pub mod playlist;

pub use id::{ItemId, MediaId, PlaylistId, SocketId};
pub use item::{PlaylistItem, QueueEntry};
pub use media::{Media, ResolvedMedia};
pub use pagination::{Page, PageParams};
pub use playlist::{
    AddPosition, AdvanceDirection, MoveDirection, Playlist, PlaylistFilter, PlaylistSummary,
};
