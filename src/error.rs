use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ShelfError {
    #[error("invalid game id: {0}")]
    InvalidGameId(String),

    #[error("invalid BGG username: {0}")]
    InvalidUsername(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("BGG request failed: {0}")]
    UpstreamHttp(String),

    #[error("BGG returned status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("BGG is still processing the request after {attempts} attempts")]
    StillProcessing { attempts: u32 },

    #[error("failed to parse BGG XML: {0}")]
    XmlParse(String),

    #[error("malformed BGG payload: {0}")]
    MalformedPayload(String),

    #[error("BGG item has no id attribute")]
    MissingItemId,

    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("failed to fetch collection for {username}: {source}")]
    CollectionFetch {
        username: String,
        #[source]
        source: Box<ShelfError>,
    },

    #[error("failed to fetch game details for {ids}: {source}")]
    GameDetailsFetch {
        ids: String,
        #[source]
        source: Box<ShelfError>,
    },

    #[error("failed to add all items")]
    BulkResolve {
        #[source]
        source: Box<ShelfError>,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("server error: {0}")]
    Server(String),
}

impl ShelfError {
    /// True when the upstream service could not produce a usable answer:
    /// a terminal status, an exhausted processing budget or a payload that
    /// does not parse. Context wrappers are looked through.
    pub fn is_upstream_unavailable(&self) -> bool {
        match self {
            ShelfError::UpstreamStatus { .. }
            | ShelfError::StillProcessing { .. }
            | ShelfError::XmlParse(_)
            | ShelfError::MalformedPayload(_) => true,
            ShelfError::CollectionFetch { source, .. }
            | ShelfError::GameDetailsFetch { source, .. }
            | ShelfError::BulkResolve { source } => source.is_upstream_unavailable(),
            _ => false,
        }
    }

    /// The innermost error, skipping context wrappers.
    pub fn root(&self) -> &ShelfError {
        match self {
            ShelfError::CollectionFetch { source, .. }
            | ShelfError::GameDetailsFetch { source, .. }
            | ShelfError::BulkResolve { source } => source.root(),
            other => other,
        }
    }

    pub fn collection(username: &str, source: ShelfError) -> Self {
        ShelfError::CollectionFetch {
            username: username.to_string(),
            source: Box::new(source),
        }
    }

    pub fn game_details(ids: &str, source: ShelfError) -> Self {
        ShelfError::GameDetailsFetch {
            ids: ids.to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn contextual_messages_carry_status() {
        let err = ShelfError::collection(
            "alice",
            ShelfError::UpstreamStatus {
                status: 404,
                message: "Not Found".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "failed to fetch collection for alice: BGG returned status 404: Not Found"
        );
        assert!(err.is_upstream_unavailable());
    }

    #[test]
    fn bulk_failure_is_generic() {
        let err = ShelfError::BulkResolve {
            source: Box::new(ShelfError::game_details(
                "1,2",
                ShelfError::StillProcessing { attempts: 6 },
            )),
        };
        assert_eq!(err.to_string(), "failed to add all items");
        assert_matches!(err.root(), ShelfError::StillProcessing { attempts: 6 });
    }

    #[test]
    fn network_failure_is_not_upstream_unavailable() {
        let err = ShelfError::UpstreamHttp("connection reset".to_string());
        assert!(!err.is_upstream_unavailable());
    }
}
