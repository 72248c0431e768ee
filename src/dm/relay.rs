//! Message relay: validate, persist, then fan out.
//!
//! Persistence strictly precedes delivery, so a message is never pushed to a
//! channel without being durable first, and delivery order per (sender,
//! recipient) pair follows insertion order.

use chrono::Utc;
use uuid::Uuid;

use crate::db::models::Message;
use crate::dm::store;
use crate::state::AppState;
use crate::ws::broadcast::send_to_user;
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::ConnectionSender;

/// Relay a direct message from an authenticated channel.
///
/// A payload without a recipient or without any content is dropped without
/// persistence or delivery. A store failure is reported as an `error` event
/// to the originating channel only; nothing is delivered for an unpersisted
/// message.
pub async fn send(
    state: &AppState,
    origin: &ConnectionSender,
    sender: &str,
    recipient: &str,
    text: Option<String>,
    file: Option<String>,
) {
    let text = text.filter(|t| !t.trim().is_empty());
    let file = file.filter(|f| !f.is_empty());

    if recipient.is_empty() || (text.is_none() && file.is_none()) {
        tracing::debug!(
            sender = %sender,
            "Ignoring send-message with no recipient or content"
        );
        return;
    }

    let message = Message {
        id: Uuid::now_v7().to_string(),
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        text,
        file,
        read: false,
        created_at: Utc::now().to_rfc3339(),
    };

    let db = state.db.clone();
    let persisted = {
        let message = message.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
            store::insert(&conn, &message).map_err(|e| e.to_string())
        })
        .await
    };

    match persisted {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(
                sender = %sender,
                recipient = %recipient,
                error = %e,
                "Failed to persist message"
            );
            protocol::send_error(origin, "Failed to send message");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Message persistence task failed");
            protocol::send_error(origin, "Failed to send message");
            return;
        }
    }

    // Fan out to every channel of the recipient and of the sender — the echo
    // keeps the sender's other devices in sync. Fire-and-forget per channel;
    // a stale channel just drops the event until liveness evicts it.
    let event = ServerEvent::ReceiveMessage(message);
    send_to_user(&state.connections, recipient, &event);
    if sender != recipient {
        send_to_user(&state.connections, sender, &event);
    }
}
