//! Song listing routes
//!
//! Endpoints:
//! - GET /api/v1/songs - Songs of the signed-in user
//! - GET /api/v1/songs/all?title= - All songs, optionally filtered by title
//! - GET /api/v1/songs/events - SSE stream of the user's `songs-changed` notifications

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::db::{Song, SongRepository};
use crate::error::Result;
use crate::session::Principal;
use crate::state::AppState;

/// Create the songs router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_mine))
        .route("/all", get(list_all))
        .route("/events", get(song_events))
}

#[derive(Debug, Deserialize)]
struct SongQuery {
    title: Option<String>,
}

/// Songs uploaded by the current user
async fn list_mine(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> Result<Json<Vec<Song>>> {
    let songs = SongRepository::new(state.db())
        .list_for_user(principal.as_str())
        .await?;
    Ok(Json(songs))
}

/// All songs, or those whose title contains `title`
async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<SongQuery>,
) -> Result<Json<Vec<Song>>> {
    let repo = SongRepository::new(state.db());
    let songs = match query.title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => repo.search_by_title(title).await?,
        _ => repo.list().await?,
    };
    Ok(Json(songs))
}

/// Refresh notifications for the current user's song list
async fn song_events(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!(
        user_id = %principal,
        clients = state.events().subscriber_count() + 1,
        "New song events client"
    );
    state.events().sse(&principal)
}
