use axum::extract::ws::Message;

use super::{ConnectionRegistry, ConnectionSender};
use crate::ws::protocol::ServerEvent;

/// Broadcast an event to all connected users.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };

    for entry in registry.iter() {
        for sender in entry.value().iter() {
            push(sender, msg.clone());
        }
    }
}

/// Send an event to a specific user (all their connections).
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };

    if let Some(connections) = registry.get(user_id) {
        for sender in connections.value().iter() {
            push(sender, msg.clone());
        }
    }
}

/// Queue a frame on one connection without blocking. A full or closed queue
/// drops the frame; liveness eviction catches the dead ones.
fn push(sender: &ConnectionSender, msg: Message) {
    if let Err(err) = sender.try_send(msg) {
        tracing::debug!(error = %err, "Dropped outbound frame");
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to encode server event");
            None
        }
    }
}
