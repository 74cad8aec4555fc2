//! Queue mutation service: insertion planning, rebalancing, delete, move
//!
//! Order keys are sparse integers. New items land in the gaps; when a gap
//! is too tight the rebalance engine respaces a bounded window around the
//! insertion point in one atomic statement. All writers of one playlist
//! serialize on a transaction-scoped advisory lock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, info, warn};

use crate::{
    models::{
        AddPosition, ItemId, MoveDirection, Page, PageParams, PlaylistId, PlaylistItem,
        QueueEntry, SocketId,
    },
    provider::MediaProvider,
    repository::{MediaRepository, PlaylistRepository, QueueRepository},
    sync::{RealtimeHub, RoomEvent, WsMessage},
    Error, Result,
};

/// Window growth factor per expansion step (3/2)
const EXPAND_NUM: i64 = 3;
const EXPAND_DEN: i64 = 2;

/// Required key span per item (existing + pending) before a window is
/// considered roomy enough
const DENSITY_FACTOR: i64 = 2;

/// Key layout for a batch insert: keys are `begin + i * delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionPlan {
    pub begin: i64,
    pub delta: i64,
}

impl InsertionPlan {
    fn keys(&self, n: i64) -> impl Iterator<Item = i64> + '_ {
        let begin = self.begin;
        let delta = self.delta;
        (0..n).map(move |i| begin + i * delta)
    }
}

/// Queue mutation service
#[derive(Clone)]
pub struct QueueService {
    pool: PgPool,
    playlists: PlaylistRepository,
    queue: QueueRepository,
    medias: MediaRepository,
    provider: Arc<dyn MediaProvider>,
    hub: RealtimeHub,
    gap: i64,
    page_size: u32,
}

impl std::fmt::Debug for QueueService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueService").finish()
    }
}

impl QueueService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        playlists: PlaylistRepository,
        queue: QueueRepository,
        medias: MediaRepository,
        provider: Arc<dyn MediaProvider>,
        hub: RealtimeHub,
        gap: i64,
        page_size: u32,
    ) -> Self {
        Self {
            pool,
            playlists,
            queue,
            medias,
            provider,
            hub,
            gap,
            page_size,
        }
    }

    /// Accept an add request and hand the heavy lifting to a detached task.
    ///
    /// Only existence, permission and URL canonicalization happen on the
    /// caller's clock. Resolution, insertion and the commit run in a task
    /// the caller cannot cancel; its outcome reaches the requesting viewer
    /// as a toast over the realtime channel.
    pub async fn add_items(
        &self,
        playlist: &PlaylistId,
        username: &str,
        urls: Vec<String>,
        position: AddPosition,
        requester: Option<SocketId>,
    ) -> Result<()> {
        self.playlists.fetch(playlist).await?;
        if !self.playlists.is_manager(playlist, username).await? {
            return Err(Error::PermissionDenied(
                "Only the owner or a manager may add to this queue".to_string(),
            ));
        }
        if urls.is_empty() {
            return Err(Error::InvalidInput("No media URLs given".to_string()));
        }

        let mut canonical = Vec::with_capacity(urls.len());
        for url in &urls {
            canonical.push(self.provider.canonicalize(url).await?);
        }

        let service = self.clone();
        let playlist = playlist.clone();
        tokio::spawn(async move {
            if let Err(err) = service
                .add_items_background(&playlist, canonical, position, requester.as_ref())
                .await
            {
                error!(playlist = %playlist, error = %err, "Background add failed");
                if let Some(socket_id) = requester.as_ref() {
                    service.hub.send(
                        socket_id,
                        WsMessage::Swap(format!(
                            "Unable to add media to the queue: {}",
                            err.public_message()
                        )),
                    );
                }
            }
        });

        Ok(())
    }

    async fn add_items_background(
        &self,
        playlist: &PlaylistId,
        urls: Vec<String>,
        position: AddPosition,
        requester: Option<&SocketId>,
    ) -> Result<()> {
        let mut resolved = Vec::with_capacity(urls.len());
        for url in urls {
            let info = self.provider.resolve(&url).await?;
            resolved.push((url, info));
        }
        let count = resolved.len() as i64;

        let mut tx = self.pool.begin().await?;
        self.playlists.lock_for_update(playlist, &mut *tx).await?;

        let mut media_ids = Vec::with_capacity(resolved.len());
        for (url, info) in resolved {
            let media = self
                .medias
                .upsert(&crate::models::Media::from_resolved(url, info), &mut *tx)
                .await?;
            media_ids.push(media.id);
        }

        let plan = self.plan_insertion(&mut tx, playlist, position, count).await?;
        debug!(
            playlist = %playlist,
            begin = plan.begin,
            delta = plan.delta,
            count,
            "Insertion planned"
        );

        for (media, key) in media_ids.into_iter().zip(plan.keys(count)) {
            self.queue
                .insert(
                    &PlaylistItem {
                        id: ItemId::new(),
                        playlist: playlist.clone(),
                        media,
                        order_key: key,
                        added_at: Utc::now(),
                    },
                    &mut *tx,
                )
                .await?;
        }

        tx.commit().await?;

        info!(playlist = %playlist, count, "Items added to queue");
        self.hub.broadcast(
            playlist,
            &WsMessage::Event {
                event: RoomEvent::RefreshPlaylist,
            },
        );
        if let Some(socket_id) = requester {
            self.hub.send(
                socket_id,
                WsMessage::Swap(format!("Added {count} item(s) to the queue")),
            );
        }

        Ok(())
    }

    /// Choose order keys for `count` new items at the requested position
    async fn plan_insertion(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        playlist: &PlaylistId,
        position: AddPosition,
        count: i64,
    ) -> Result<InsertionPlan> {
        let end_plan = |bounds: Option<(i64, i64)>| InsertionPlan {
            begin: bounds.map_or(0, |(_, max)| max + self.gap),
            delta: self.gap,
        };

        match position {
            AddPosition::AddToStart => {
                let bounds = self.queue.key_bounds(playlist, &mut **tx).await?;
                Ok(InsertionPlan {
                    begin: bounds.map_or(0, |(min, _)| min - self.gap * count),
                    delta: self.gap,
                })
            }
            AddPosition::AddToEnd => {
                let bounds = self.queue.key_bounds(playlist, &mut **tx).await?;
                Ok(end_plan(bounds))
            }
            AddPosition::QueueNext => {
                let Some(current) = self.playlists.current_with_executor(playlist, &mut **tx).await?
                else {
                    // Nothing playing: queue-next degrades to append
                    let bounds = self.queue.key_bounds(playlist, &mut **tx).await?;
                    return Ok(end_plan(bounds));
                };

                let current_item = self
                    .queue
                    .get_item(playlist, &current, &mut **tx)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Item {current} not found")))?;

                match self
                    .queue
                    .neighbor_after(playlist, current_item.order_key, &mut **tx)
                    .await?
                {
                    None => Ok(InsertionPlan {
                        begin: current_item.order_key + self.gap,
                        delta: self.gap,
                    }),
                    Some(next) => {
                        self.rebalance(
                            tx,
                            playlist,
                            current_item.order_key,
                            next.order_key,
                            &current,
                            count,
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Respace the keys around an insertion point until `k` new keys fit.
    ///
    /// The window grows geometrically until its span reaches twice the
    /// number of items it must hold (existing plus pending), then every
    /// existing key in it is rewritten to a uniform stride with a
    /// `delta * k` hole reserved right after `before`. Runs under the
    /// playlist advisory lock, so concurrent rewrites of overlapping
    /// windows cannot interleave.
    async fn rebalance(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        playlist: &PlaylistId,
        mut start: i64,
        mut end: i64,
        before: &ItemId,
        k: i64,
    ) -> Result<InsertionPlan> {
        let mut count = self
            .queue
            .count_in_window(playlist, start, end, &mut **tx)
            .await?;

        while window_is_dense(start, end, k, count) {
            (start, end) = expand_window(start, end);
            count = self
                .queue
                .count_in_window(playlist, start, end, &mut **tx)
                .await?;
        }

        let delta = (end - start) / (k + count - 1).max(1);

        let before_key = |item: Option<PlaylistItem>| {
            item.map(|i| i.order_key)
                .ok_or_else(|| Error::NotFound(format!("Item {before} not found")))
        };
        let mut anchor = before_key(self.queue.get_item(playlist, before, &mut **tx).await?)?;

        // With fewer than two items in the window there is nothing to
        // respace and the stride already fits
        if count >= 2 {
            let rewritten = self
                .queue
                .rewrite_window(playlist, start, end, delta, anchor, delta * k, &mut **tx)
                .await?;
            info!(
                playlist = %playlist,
                start,
                end,
                delta,
                rewritten,
                pending = k,
                "Rebalanced order keys"
            );
            anchor = before_key(self.queue.get_item(playlist, before, &mut **tx).await?)?;
        }

        Ok(InsertionPlan {
            begin: anchor + delta,
            delta,
        })
    }

    /// Delete items from a queue; clears `current` in the same transaction
    /// when it points at one of them. Returns the number of rows removed.
    pub async fn delete_items(
        &self,
        playlist: &PlaylistId,
        username: &str,
        items: &[ItemId],
    ) -> Result<u64> {
        self.playlists.fetch(playlist).await?;
        if !self.playlists.is_manager(playlist, username).await? {
            return Err(Error::PermissionDenied(
                "Only the owner or a manager may delete from this queue".to_string(),
            ));
        }
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        self.playlists.lock_for_update(playlist, &mut *tx).await?;

        let current = self.playlists.current_with_executor(playlist, &mut *tx).await?;
        let current_deleted = current.as_ref().is_some_and(|c| items.contains(c));

        let deleted = self.queue.delete(playlist, items, &mut *tx).await?;
        if current_deleted {
            self.playlists
                .set_current_with_executor(playlist, None, &mut *tx)
                .await?;
        }

        tx.commit().await?;

        if deleted > 0 {
            info!(playlist = %playlist, deleted, current_deleted, "Items deleted from queue");
            self.hub.broadcast(
                playlist,
                &WsMessage::Event {
                    event: RoomEvent::RefreshPlaylist,
                },
            );
            if current_deleted {
                self.hub.clear_votes(playlist);
            }
        }

        Ok(deleted)
    }

    /// Move each selected item one step toward the queue head (`Up`) or
    /// tail (`Down`) by swapping keys with its nearest neighbor.
    ///
    /// Items are processed head-first for `Up` and tail-first for `Down`
    /// so a contiguous selection at the edge stays put instead of rolling
    /// over itself. Returns how many distinct items changed keys.
    pub async fn move_items(
        &self,
        playlist: &PlaylistId,
        username: &str,
        items: &[ItemId],
        direction: MoveDirection,
    ) -> Result<usize> {
        self.playlists.fetch(playlist).await?;
        if !self.playlists.is_manager(playlist, username).await? {
            return Err(Error::PermissionDenied(
                "Only the owner or a manager may reorder this queue".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        self.playlists.lock_for_update(playlist, &mut *tx).await?;

        let mut selected = Vec::with_capacity(items.len());
        for id in items {
            let item = self
                .queue
                .get_item(playlist, id, &mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Item {id} not found")))?;
            selected.push((id.clone(), item.order_key));
        }
        match direction {
            MoveDirection::Up => selected.sort_by_key(|(_, key)| *key),
            MoveDirection::Down => selected.sort_by_key(|(_, key)| std::cmp::Reverse(*key)),
        }

        let mut blocked: Option<ItemId> = None;
        let mut affected: HashSet<ItemId> = HashSet::new();

        for (id, _) in selected {
            // Earlier swaps in this batch may have changed the key
            let key = self
                .queue
                .get_item(playlist, &id, &mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Item {id} not found")))?
                .order_key;

            let neighbor = match direction {
                MoveDirection::Up => self.queue.neighbor_before(playlist, key, &mut *tx).await?,
                MoveDirection::Down => self.queue.neighbor_after(playlist, key, &mut *tx).await?,
            };

            // No neighbor, or the neighbor is the previous item that
            // itself could not move: this item is pinned too
            let Some(neighbor) = neighbor else {
                blocked = Some(id);
                continue;
            };
            if blocked.as_ref() == Some(&neighbor.id) {
                blocked = Some(id);
                continue;
            }

            self.queue
                .swap_keys(playlist, &id, &neighbor.id, key, neighbor.order_key, &mut *tx)
                .await?;
            affected.insert(id);
            affected.insert(neighbor.id);
        }

        tx.commit().await?;

        if affected.is_empty() {
            debug!(playlist = %playlist, "Move request changed nothing");
        } else {
            info!(playlist = %playlist, moved = affected.len(), "Items moved");
            self.hub.broadcast(
                playlist,
                &WsMessage::Event {
                    event: RoomEvent::RefreshPlaylist,
                },
            );
        }

        Ok(affected.len())
    }

    /// One page of the queue with media metadata.
    ///
    /// Page 0 (or no page) means the last page, where freshly appended
    /// items land.
    pub async fn list_page(
        &self,
        playlist: &PlaylistId,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<Page<QueueEntry>> {
        self.playlists.fetch(playlist).await?;

        let page_size = page_size.or(Some(self.page_size));
        let total = self.queue.total(playlist).await?.max(0) as u64;
        let params = match page {
            None | Some(0) => PageParams::last_page(total, page_size),
            Some(page) => PageParams::new(Some(page), page_size),
        };

        let entries = self.queue.list_page(playlist, params).await?;
        if entries.is_empty() && total > 0 && params.offset() as u64 >= total {
            warn!(playlist = %playlist, page = params.page, "Page past the end of the queue");
        }

        Ok(Page::new(entries, total, params))
    }
}

/// Whether `[start, end]` still lacks room for `k` insertions next to
/// `count` existing items
const fn window_is_dense(start: i64, end: i64, k: i64, count: i64) -> bool {
    end - start < DENSITY_FACTOR * (k + count)
}

/// One geometric growth step of the rebalance window
const fn expand_window(start: i64, end: i64) -> (i64, i64) {
    let length = end - start;
    let growth = EXPAND_NUM * length / EXPAND_DEN;
    (start - growth, end + growth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_keys_stride() {
        let plan = InsertionPlan {
            begin: 512,
            delta: 256,
        };
        let keys: Vec<i64> = plan.keys(3).collect();
        assert_eq!(keys, vec![512, 768, 1024]);
    }

    #[test]
    fn test_window_expansion_terminates() {
        // Two adjacent keys, one pending insert: the worst case
        let (mut start, mut end) = (0, 1);
        let mut steps = 0;
        while window_is_dense(start, end, 1, 2) {
            (start, end) = expand_window(start, end);
            steps += 1;
            assert!(steps < 64, "expansion did not terminate");
        }
        assert!(end - start >= 2 * 3);
        // Stride stays positive afterwards
        let delta = (end - start) / (1 + 2 - 1);
        assert!(delta >= 1);
    }

    #[test]
    fn test_roomy_window_not_expanded() {
        // [0, 1024] with two border items and one pending insert
        assert!(!window_is_dense(0, 1024, 1, 2));
        let delta = (1024 - 0) / (1 + 2 - 1);
        assert_eq!(delta, 512);
    }

    #[test]
    fn test_expansion_is_symmetric_growth() {
        let (start, end) = expand_window(0, 10);
        assert_eq!((start, end), (-15, 25));
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.expect("connect to database");
        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .expect("run migrations");
        pool
    }

    fn test_service(pool: &PgPool) -> QueueService {
        QueueService::new(
            pool.clone(),
            PlaylistRepository::new(pool.clone()),
            QueueRepository::new(pool.clone()),
            MediaRepository::new(pool.clone()),
            Arc::new(crate::provider::DirectUrlProvider),
            RealtimeHub::new(),
            1024,
            10,
        )
    }

    /// Fresh playlist owned by "owner" with one item per key
    async fn seed_playlist(pool: &PgPool, keys: &[i64]) -> (PlaylistId, Vec<ItemId>) {
        let playlists = PlaylistRepository::new(pool.clone());
        let queue = QueueRepository::new(pool.clone());
        let medias = MediaRepository::new(pool.clone());

        let playlist = playlists
            .create(&crate::models::Playlist::new(
                "fixture".to_string(),
                "owner".to_string(),
            ))
            .await
            .expect("create playlist");

        let mut ids = Vec::new();
        for key in keys {
            let media = medias
                .upsert(
                    &crate::models::Media::from_resolved(
                        format!("https://example.com/{}/{key}", playlist.id),
                        crate::models::ResolvedMedia {
                            title: format!("media {key}"),
                            artist: String::new(),
                            duration_seconds: 60,
                            aspect_ratio: "16/9".to_string(),
                            kind: "video".to_string(),
                        },
                    ),
                    pool,
                )
                .await
                .expect("upsert media");

            let item = PlaylistItem {
                id: ItemId::new(),
                playlist: playlist.id.clone(),
                media: media.id,
                order_key: *key,
                added_at: Utc::now(),
            };
            queue.insert(&item, pool).await.expect("insert item");
            ids.push(item.id);
        }

        (playlist.id, ids)
    }

    async fn order_key_of(pool: &PgPool, playlist: &PlaylistId, item: &ItemId) -> i64 {
        QueueRepository::new(pool.clone())
            .get_item(playlist, item, pool)
            .await
            .expect("read item")
            .expect("item exists")
            .order_key
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_queue_next_between_adjacent_items() {
        // [A(0), B(1)] leaves no key between A and B: queue-next must
        // rebalance, and X still lands strictly between them
        let pool = test_pool().await;
        let service = test_service(&pool);
        let (playlist, ids) = seed_playlist(&pool, &[0, 1]).await;
        let playlists = PlaylistRepository::new(pool.clone());
        let queue = QueueRepository::new(pool.clone());
        playlists
            .set_current_with_executor(&playlist, Some(&ids[0]), &pool)
            .await
            .unwrap();

        let media = queue
            .get_item(&playlist, &ids[0], &pool)
            .await
            .unwrap()
            .unwrap()
            .media;

        let mut tx = pool.begin().await.unwrap();
        playlists.lock_for_update(&playlist, &mut *tx).await.unwrap();
        let plan = service
            .plan_insertion(&mut tx, &playlist, AddPosition::QueueNext, 1)
            .await
            .unwrap();
        let x = PlaylistItem {
            id: ItemId::new(),
            playlist: playlist.clone(),
            media,
            order_key: plan.begin,
            added_at: Utc::now(),
        };
        queue.insert(&x, &mut *tx).await.unwrap();
        tx.commit().await.unwrap();

        let page = service.list_page(&playlist, Some(1), Some(10)).await.unwrap();
        let listed: Vec<ItemId> = page.items.iter().map(|e| e.id.clone()).collect();
        assert_eq!(listed, vec![ids[0].clone(), x.id.clone(), ids[1].clone()]);

        let key_a = order_key_of(&pool, &playlist, &ids[0]).await;
        let key_x = order_key_of(&pool, &playlist, &x.id).await;
        let key_b = order_key_of(&pool, &playlist, &ids[1]).await;
        assert!(key_a < key_x && key_x < key_b);
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_delete_current_clears_cursor() {
        let pool = test_pool().await;
        let service = test_service(&pool);
        let (playlist, ids) = seed_playlist(&pool, &[0, 1024]).await;
        let playlists = PlaylistRepository::new(pool.clone());
        playlists
            .set_current_with_executor(&playlist, Some(&ids[0]), &pool)
            .await
            .unwrap();

        let deleted = service
            .delete_items(&playlist, "owner", &[ids[0].clone()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let row = playlists.fetch(&playlist).await.unwrap();
        assert_eq!(row.current, None);
        assert_eq!(
            QueueRepository::new(pool.clone()).total(&playlist).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_move_first_item_up_is_noop() {
        let pool = test_pool().await;
        let service = test_service(&pool);
        let (playlist, ids) = seed_playlist(&pool, &[0, 1024, 2048]).await;

        let moved = service
            .move_items(&playlist, "owner", &[ids[0].clone()], MoveDirection::Up)
            .await
            .unwrap();
        assert_eq!(moved, 0);

        let page = service.list_page(&playlist, Some(1), Some(10)).await.unwrap();
        let listed: Vec<ItemId> = page.items.iter().map(|e| e.id.clone()).collect();
        assert_eq!(listed, ids);
    }
}
