//! REST surface for conversation history and read receipts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::middleware::Claims;
use crate::db::models::Message;
use crate::dm::store;
use crate::state::AppState;

/// GET /api/messages/{user_id}/{other_id} — chronological history for the
/// pair. JWT auth required; the caller must be one of the two participants.
pub async fn get_history(
    State(state): State<AppState>,
    claims: Claims,
    Path((user_id, other_id)): Path<(String, String)>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    if claims.sub != user_id && claims.sub != other_id {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.db.clone();
    let messages = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::history(&conn, &user_id, &other_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(messages))
}

/// PATCH /api/messages/{user_id}/{other_id}/read — mark every unread message
/// from other_id to user_id as read. JWT auth required; only the reader may
/// acknowledge. Idempotent; returns no content.
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Path((user_id, other_id)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    if claims.sub != user_id {
        return Err(StatusCode::FORBIDDEN);
    }

    let db = state.db.clone();
    let updated = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::mark_read(&conn, &user_id, &other_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::debug!(updated = updated, "Read receipt applied");

    Ok(StatusCode::NO_CONTENT)
}
