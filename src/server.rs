use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::bgg::BggClient;
use crate::domain::{CollectionItem, GamePayload, Username, parse_game_ids};
use crate::error::ShelfError;
use crate::resolver::fetch_games;

/// Shared handler state. The upstream client is blocking and only used from
/// `spawn_blocking` threads.
#[derive(Clone)]
pub struct AppState {
    client: Arc<dyn BggClient>,
}

impl AppState {
    pub fn new(client: Arc<dyn BggClient>) -> Self {
        Self { client }
    }
}

/// JSON routes for the card UI. Failures answer `{ "error": "..." }`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/collection/:username", get(get_collection))
        .route("/game/:ids", get(get_game))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Binds `addr` and serves until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ShelfError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ShelfError::Server(format!("bind {addr}: {err}")))?;
    info!("shelf-shuffler listening on http://{addr}");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ShelfError::Server(err.to_string()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
    }
}

/// GET /collection/:username
async fn get_collection(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<CollectionItem>>, ApiError> {
    let username: Username = username.parse()?;
    let client = Arc::clone(&state.client);
    let items = run_blocking(move || client.fetch_collection(&username)).await?;
    Ok(Json(items))
}

/// GET /game/:ids
///
/// A single id answers one object, a comma-joined list answers an array.
async fn get_game(
    State(state): State<AppState>,
    Path(ids): Path<String>,
) -> Result<Json<GamePayload>, ApiError> {
    let parsed = parse_game_ids(&ids)?;
    let client = Arc::clone(&state.client);
    let games = run_blocking(move || fetch_games(client.as_ref(), &parsed)).await?;

    if ids.contains(',') {
        return Ok(Json(GamePayload::Many(games)));
    }
    let game = games
        .into_iter()
        .next()
        .ok_or_else(|| ShelfError::GameNotFound(ids.trim().to_string()))?;
    Ok(Json(GamePayload::One(game)))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "shelf-shuffler".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn run_blocking<T, F>(task: F) -> Result<T, ShelfError>
where
    F: FnOnce() -> Result<T, ShelfError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ShelfError::Server(err.to_string()))?
}

#[derive(Debug)]
pub struct ApiError(ShelfError);

impl From<ShelfError> for ApiError {
    fn from(err: ShelfError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.root() {
            ShelfError::InvalidGameId(_) | ShelfError::InvalidUsername(_) => {
                StatusCode::BAD_REQUEST
            }
            ShelfError::GameNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
