use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::domain::NormalizedGame;
use crate::store::Store;

/// Storage key holding the serialized detail cache.
pub const CACHE_KEY: &str = "shelf_shuffle_game_cache";

pub type CacheMap = BTreeMap<String, NormalizedGame>;

/// Best-effort id → detail store. Failures are logged and never reach the
/// caller: a broken cache behaves like an empty one.
pub trait GameCache: Send + Sync {
    fn load(&self) -> CacheMap;
    /// Merges `games` by id, overwriting existing entries.
    fn save(&self, games: &[NormalizedGame]);
    fn clear(&self);

    fn get(&self, id: &str) -> Option<NormalizedGame> {
        self.load().remove(id)
    }

    fn len(&self) -> usize {
        self.load().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: GameCache + ?Sized> GameCache for Box<T> {
    fn load(&self) -> CacheMap {
        (**self).load()
    }

    fn save(&self, games: &[NormalizedGame]) {
        (**self).save(games)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

#[derive(Debug, Clone)]
pub struct FileGameCache {
    store: Store,
}

impl FileGameCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl GameCache for FileGameCache {
    fn load(&self) -> CacheMap {
        let bytes = match self.store.read(CACHE_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CacheMap::new(),
            Err(err) => {
                warn!(error = %err, "failed to load game cache");
                return CacheMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(err) => {
                warn!(error = %err, "game cache is corrupt; treating as empty");
                CacheMap::new()
            }
        }
    }

    fn save(&self, games: &[NormalizedGame]) {
        if games.is_empty() {
            return;
        }
        let mut map = self.load();
        merge(&mut map, games);
        let content = match serde_json::to_vec(&map) {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "failed to serialize game cache");
                return;
            }
        };
        match self.store.write_atomic(CACHE_KEY, &content) {
            Ok(()) => debug!(saved = games.len(), total = map.len(), "game cache updated"),
            Err(err) => warn!(error = %err, "failed to save to game cache"),
        }
    }

    fn clear(&self) {
        if let Err(err) = self.store.remove(CACHE_KEY) {
            warn!(error = %err, "failed to clear game cache");
        }
    }
}

/// In-process cache; used for tests and for runs that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryGameCache {
    games: Mutex<CacheMap>,
}

impl MemoryGameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_games(games: &[NormalizedGame]) -> Self {
        let cache = Self::new();
        cache.save(games);
        cache
    }
}

impl GameCache for MemoryGameCache {
    fn load(&self) -> CacheMap {
        match self.games.lock() {
            Ok(games) => games.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, games: &[NormalizedGame]) {
        let mut guard = match self.games.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        merge(&mut guard, games);
    }

    fn clear(&self) {
        let mut guard = match self.games.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.clear();
    }
}

fn merge(map: &mut CacheMap, games: &[NormalizedGame]) {
    for game in games {
        map.insert(game.id.clone(), game.clone());
    }
}
