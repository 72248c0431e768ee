//! REST surface for notification ingestion and state changes.
//!
//! Persistence happens here; the fan-out component is invoked after every
//! successful mutation so connected clients see the change without polling.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::models::Notification;
use crate::notify::{fanout, store};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: Option<String>,
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub related_id: Option<String>,
    #[serde(default)]
    pub global: bool,
    pub metadata: Option<serde_json::Value>,
}

/// POST /api/notifications — persist a notification and deliver it to its
/// audience. JWT auth required. A non-global record must name a target user.
pub async fn create_notification(
    State(state): State<AppState>,
    _claims: Claims,
    Json(body): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), StatusCode> {
    if !body.global && body.user_id.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let notification = Notification {
        id: Uuid::now_v7().to_string(),
        user_id: if body.global { None } else { body.user_id },
        kind: body.kind,
        title: body.title,
        body: body.body,
        related_id: body.related_id,
        read: false,
        read_by: Vec::new(),
        global: body.global,
        metadata: body.metadata,
        created_at: Utc::now().to_rfc3339(),
    };

    let db = state.db.clone();
    {
        let notification = notification.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            store::insert(&conn, &notification).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
        })
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;
    }

    fanout::deliver(&state.connections, &notification);

    Ok((StatusCode::CREATED, Json(notification)))
}

/// GET /api/notifications — the caller's personal records plus global ones,
/// newest first. JWT auth required.
pub async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let notifications = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::list_for_user(&conn, &user_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(notifications))
}

/// PATCH /api/notifications/{id}/read — flip read state for the caller, then
/// push a notification-read update to the same audience as the original.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let reader = claims.sub;
    let lookup_id = id.clone();

    let updated = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::mark_read(&conn, &lookup_id, &reader).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let Some(n) = updated else {
        return Err(StatusCode::NOT_FOUND);
    };

    fanout::deliver_read_update(&state.connections, &n.id, n.user_id.as_deref(), n.global);

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/notifications/{id} — remove a record, then push a
/// notification-removed update to the same audience as the original.
pub async fn delete_notification(
    State(state): State<AppState>,
    _claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let lookup_id = id.clone();

    let removed = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::delete(&conn, &lookup_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let Some(n) = removed else {
        return Err(StatusCode::NOT_FOUND);
    };

    fanout::deliver_removed(&state.connections, &n.id, n.user_id.as_deref(), n.global);

    Ok(StatusCode::NO_CONTENT)
}
