use serde::Serialize;

use crate::domain::NormalizedGame;

/// Games picked for printing, in pick order, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PrintQueue {
    games: Vec<NormalizedGame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueToggle {
    Added,
    Removed,
}

impl PrintQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.games.iter().any(|game| game.id == id)
    }

    /// Appends `game` unless its id is already queued. Returns whether it was
    /// added.
    pub fn add(&mut self, game: NormalizedGame) -> bool {
        if self.contains(&game.id) {
            return false;
        }
        self.games.push(game);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.games.len();
        self.games.retain(|game| game.id != id);
        self.games.len() != before
    }

    /// Appends every game whose id is not queued yet, keeping input order.
    pub fn merge<I>(&mut self, games: I) -> usize
    where
        I: IntoIterator<Item = NormalizedGame>,
    {
        let mut added = 0;
        for game in games {
            if self.add(game) {
                added += 1;
            }
        }
        added
    }

    pub fn clear(&mut self) {
        self.games.clear();
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedGame> {
        self.games.iter()
    }
}
