//! Presence tracking derived from the connection registry.
//!
//! The presence set is never stored: it is the set of identities with at
//! least one live channel. Every registration or eviction is followed by a
//! full `online-users` snapshot broadcast, so a client that misses one update
//! self-corrects on the next.

use axum::{extract::State, Json};

use crate::auth::middleware::Claims;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Current presence set as a sorted list of identities.
pub fn online_identities(registry: &ConnectionRegistry) -> Vec<String> {
    let mut users: Vec<String> = registry.iter().map(|entry| entry.key().clone()).collect();
    users.sort();
    users
}

/// Broadcast the full presence snapshot to every live channel.
/// Called from the WS actor after every register/unregister.
pub fn broadcast_online_users(registry: &ConnectionRegistry) {
    let users = online_identities(registry);
    broadcast_to_all(registry, &ServerEvent::OnlineUsers { users });
}

/// GET /api/presence — current presence snapshot. JWT auth required.
pub async fn get_presence(State(state): State<AppState>, _claims: Claims) -> Json<Vec<String>> {
    Json(online_identities(&state.connections))
}
