use axum::extract::ws::Message as WsFrame;
use serde::{Deserialize, Serialize};

use crate::db::models::{Message, Notification};
use crate::dm::relay;
use crate::state::AppState;
use crate::ws::ConnectionSender;

/// Inbound channel events — a closed set, dispatched by the `type` tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Relay a direct message to another user.
    SendMessage {
        recipient: String,
        text: Option<String>,
        file: Option<String>,
    },
    /// Explicit notification-scope join. Idempotent; delivery targeting is
    /// registry-based, so this only validates the claimed identity.
    JoinNotificationRoom {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

/// Outbound channel events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full presence snapshot, re-sent on every register/evict.
    OnlineUsers { users: Vec<String> },
    ReceiveMessage(Message),
    NewNotification(Notification),
    NotificationRead {
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
    NotificationRemoved {
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
    Error { message: String },
}

/// Handle an incoming text frame: decode the tagged event and dispatch.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to decode client event"
            );
            send_error(tx, "Malformed event");
            return;
        }
    };

    match event {
        ClientEvent::SendMessage {
            recipient,
            text,
            file,
        } => {
            relay::send(state, tx, user_id, &recipient, text, file).await;
        }
        ClientEvent::JoinNotificationRoom { user_id: claimed } => {
            // The registry entry made at handshake already scopes delivery.
            if claimed != user_id {
                tracing::warn!(
                    user_id = %user_id,
                    claimed = %claimed,
                    "Notification room join for another identity ignored"
                );
            }
        }
    }
}

/// Encode and send an event to one connection, dropping on a full queue.
pub fn send_event(tx: &ConnectionSender, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if let Err(err) = tx.try_send(WsFrame::Text(json.into())) {
                tracing::debug!(error = %err, "Dropped outbound event");
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to encode server event");
        }
    }
}

/// Send an error event to the originating connection.
pub fn send_error(tx: &ConnectionSender, message: &str) {
    send_event(
        tx,
        &ServerEvent::Error {
            message: message.to_string(),
        },
    );
}
