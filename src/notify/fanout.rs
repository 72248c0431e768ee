//! Notification fan-out: targeting-and-push over already-persisted records.
//!
//! Global records go to every connected channel; user records go only to the
//! channels registered for that user. Persistence belongs to the REST layer,
//! which calls back in here after every successful mutation so connected
//! clients track store state without re-polling.

use crate::db::models::Notification;
use crate::ws::broadcast::{broadcast_to_all, send_to_user};
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionRegistry;

/// Deliver a persisted notification to its audience.
pub fn deliver(registry: &ConnectionRegistry, notification: &Notification) {
    let event = ServerEvent::NewNotification(notification.clone());
    route(
        registry,
        notification.global,
        notification.user_id.as_deref(),
        &event,
    );
}

/// Tell the audience a notification was marked read.
pub fn deliver_read_update(
    registry: &ConnectionRegistry,
    notification_id: &str,
    user_id: Option<&str>,
    is_global: bool,
) {
    let event = ServerEvent::NotificationRead {
        notification_id: notification_id.to_string(),
    };
    route(registry, is_global, user_id, &event);
}

/// Tell the audience a notification was deleted.
pub fn deliver_removed(
    registry: &ConnectionRegistry,
    notification_id: &str,
    user_id: Option<&str>,
    is_global: bool,
) {
    let event = ServerEvent::NotificationRemoved {
        notification_id: notification_id.to_string(),
    };
    route(registry, is_global, user_id, &event);
}

fn route(
    registry: &ConnectionRegistry,
    is_global: bool,
    user_id: Option<&str>,
    event: &ServerEvent,
) {
    if is_global {
        broadcast_to_all(registry, event);
    } else if let Some(user_id) = user_id {
        send_to_user(registry, user_id, event);
    } else {
        tracing::warn!("Notification neither global nor user-scoped, nothing to deliver");
    }
}
