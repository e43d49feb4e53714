use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ShelfError;

/// Upstream-assigned numeric game id, kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameId(String);

impl GameId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GameId {
    type Err = ShelfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(ShelfError::InvalidGameId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Parses `"13"` or `"13,822,9209"` into ids, rejecting empty segments.
pub fn parse_game_ids(value: &str) -> Result<Vec<GameId>, ShelfError> {
    let ids = value
        .split(',')
        .map(|part| part.parse::<GameId>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ShelfError::InvalidGameId(value.to_string()))?;
    Ok(ids)
}

pub fn join_game_ids(ids: &[GameId]) -> String {
    ids.iter()
        .map(GameId::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Username {
    type Err = ShelfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized
                .chars()
                .any(|ch| ch.is_whitespace() || matches!(ch, '/' | '?' | '&' | '#'));
        if !is_valid {
            return Err(ShelfError::InvalidUsername(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// One owned game as listed in a user's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub id: String,
    pub name: String,
    pub image: String,
    pub thumbnail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_published: Option<i32>,
}

impl CollectionItem {
    pub fn matches(&self, search: &str) -> bool {
        self.name.to_lowercase().contains(&search.to_lowercase())
    }
}

pub fn filter_collection<'a>(items: &'a [CollectionItem], search: &str) -> Vec<&'a CollectionItem> {
    items.iter().filter(|item| item.matches(search)).collect()
}

/// Detail record consumed by card rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGame {
    pub id: String,
    pub title: String,
    pub designer: String,
    pub artist: String,
    pub image: String,
    pub description: String,
    pub players: String,
    pub time: String,
    pub weight: f64,
}

/// Body of the local `/game/<ids>` endpoint: one object for a single id, an
/// array for a comma-joined list. `Deserialize` and `into_games` let clients
/// of that endpoint read either shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GamePayload {
    Many(Vec<NormalizedGame>),
    One(NormalizedGame),
}

impl GamePayload {
    pub fn into_games(self) -> Vec<NormalizedGame> {
        match self {
            GamePayload::Many(games) => games,
            GamePayload::One(game) => vec![game],
        }
    }
}
