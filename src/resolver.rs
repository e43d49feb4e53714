use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::bgg::BggClient;
use crate::cache::GameCache;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::domain::{CollectionItem, GameId, NormalizedGame};
use crate::error::ShelfError;
use crate::normalizer::normalize;
use crate::queue::{PrintQueue, QueueToggle};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkAddResult {
    /// Records resolved from cache or upstream.
    pub resolved: usize,
    /// Records that were not queued before.
    pub added: usize,
}

/// Fetches and normalizes details for `ids` without touching any cache.
pub fn fetch_games<C: BggClient + ?Sized>(
    client: &C,
    ids: &[GameId],
) -> Result<Vec<NormalizedGame>, ShelfError> {
    client
        .fetch_item_details(ids)?
        .iter()
        .map(normalize)
        .collect()
}

/// Cache-first detail lookups for single games and whole selections.
pub struct Resolver<C: BggClient, K: GameCache> {
    client: C,
    cache: K,
    chunk_size: usize,
}

impl<C: BggClient, K: GameCache> Resolver<C, K> {
    pub fn new(client: C, cache: K) -> Self {
        Self::with_chunk_size(client, cache, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(client: C, cache: K, chunk_size: usize) -> Self {
        Self {
            client,
            cache,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cache(&self) -> &K {
        &self.cache
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn resolve_one(
        &self,
        item: &CollectionItem,
        sink: &dyn ProgressSink,
    ) -> Result<NormalizedGame, ShelfError> {
        if let Some(game) = self.cache.get(&item.id) {
            sink.event(ProgressEvent {
                message: format!("phase=Cache; hit {}", item.id),
                elapsed: None,
            });
            return Ok(game);
        }

        let id: GameId = item.id.parse()?;
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; game {id}"),
            elapsed: None,
        });
        let start = Instant::now();
        let game = fetch_games(&self.client, std::slice::from_ref(&id))?
            .into_iter()
            .find(|game| game.id == item.id)
            .ok_or_else(|| ShelfError::GameNotFound(item.id.clone()))?;
        self.cache.save(std::slice::from_ref(&game));
        sink.event(ProgressEvent {
            message: format!("phase=Store; cached {id}"),
            elapsed: Some(start.elapsed()),
        });
        Ok(game)
    }

    /// Resolves every item, serving cached ids locally and fetching the rest
    /// in sequential chunks of `chunk_size`.
    pub fn resolve_many(
        &self,
        items: &[CollectionItem],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<NormalizedGame>, ShelfError> {
        let ids = items
            .iter()
            .map(|item| item.id.parse::<GameId>())
            .collect::<Result<Vec<_>, _>>()?;
        self.resolve_ids(&ids, sink)
    }

    /// Same as [`Resolver::resolve_many`] for bare ids. Repeated ids are
    /// resolved once.
    ///
    /// Each chunk is cached as soon as it is normalized. The first failing
    /// chunk aborts the call; chunks fetched before it stay cached.
    pub fn resolve_ids(
        &self,
        ids: &[GameId],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<NormalizedGame>, ShelfError> {
        let cached_map = self.cache.load();
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match cached_map.get(id.as_str()) {
                Some(game) => resolved.push(game.clone()),
                None => missing.push(id.clone()),
            }
        }

        info!(
            cached = resolved.len(),
            to_fetch = missing.len(),
            chunk_size = self.chunk_size,
            "resolving games"
        );

        let chunk_count = missing.len().div_ceil(self.chunk_size);
        for (index, chunk) in missing.chunks(self.chunk_size).enumerate() {
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Fetch; chunk {}/{} ({} games)",
                    index + 1,
                    chunk_count,
                    chunk.len()
                ),
                elapsed: None,
            });
            let start = Instant::now();
            let games = fetch_games(&self.client, chunk)?;
            self.cache.save(&games);
            sink.event(ProgressEvent {
                message: format!("phase=Store; cached {} games", games.len()),
                elapsed: Some(start.elapsed()),
            });
            resolved.extend(games);
        }

        Ok(resolved)
    }

    /// "Add all": resolves `items` and appends the unseen ones to `queue`.
    pub fn add_all_to_queue(
        &self,
        items: &[CollectionItem],
        queue: &mut PrintQueue,
        sink: &dyn ProgressSink,
    ) -> Result<BulkAddResult, ShelfError> {
        if items.is_empty() {
            return Ok(BulkAddResult {
                resolved: 0,
                added: 0,
            });
        }
        let games = self
            .resolve_many(items, sink)
            .map_err(|err| ShelfError::BulkResolve {
                source: Box::new(err),
            })?;
        let resolved = games.len();
        let added = queue.merge(games);
        Ok(BulkAddResult { resolved, added })
    }

    /// Removes the item from `queue` when present, otherwise resolves and
    /// appends it.
    pub fn toggle_in_queue(
        &self,
        item: &CollectionItem,
        queue: &mut PrintQueue,
        sink: &dyn ProgressSink,
    ) -> Result<QueueToggle, ShelfError> {
        if queue.remove(&item.id) {
            return Ok(QueueToggle::Removed);
        }
        let game = self.resolve_one(item, sink)?;
        queue.add(game);
        Ok(QueueToggle::Added)
    }
}
