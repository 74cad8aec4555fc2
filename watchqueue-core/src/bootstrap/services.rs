//! Service initialization and dependency injection

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    provider::MediaProvider,
    repository::{MediaRepository, PlaylistRepository, QueueRepository},
    service::{PlaybackService, PlaylistService, QueueService},
    sync::RealtimeHub,
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Playlist lifecycle and roster service
    pub playlist_service: PlaylistService,
    /// Queue mutation service
    pub queue_service: QueueService,
    /// Playback cursor and viewer session service
    pub playback_service: PlaybackService,
    /// Realtime viewer hub, for shutdown and monitoring
    pub hub: RealtimeHub,
}

/// Initialize all core services
pub fn init_services(
    pool: PgPool,
    config: &Config,
    provider: Arc<dyn MediaProvider>,
) -> Services {
    info!("Initializing services...");

    let playlists = PlaylistRepository::new(pool.clone());
    let queue = QueueRepository::new(pool.clone());
    let medias = MediaRepository::new(pool.clone());
    let hub = RealtimeHub::new();

    let playlist_service = PlaylistService::new(playlists.clone(), hub.clone());
    let queue_service = QueueService::new(
        pool.clone(),
        playlists.clone(),
        queue.clone(),
        medias.clone(),
        provider,
        hub.clone(),
        config.queue.order_gap,
        config.queue.page_size,
    );
    let playback_service = PlaybackService::new(pool, playlists, queue, medias, hub.clone());

    info!("Services initialized");

    Services {
        playlist_service,
        queue_service,
        playback_service,
        hub,
    }
}
