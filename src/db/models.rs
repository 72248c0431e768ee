//! Persistent record types for the message and notification stores.
//! These are serialized directly onto the wire (`receive-message`,
//! `new-notification`) and in REST responses, so field names follow the
//! client contract rather than the column names.

use serde::{Deserialize, Serialize};

/// Direct message between two users.
/// Immutable after insert except `read`, which flips false -> true in bulk
/// when the recipient acknowledges the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub text: Option<String>,
    pub file: Option<String>,
    pub read: bool,
    pub created_at: String,
}

/// User-scoped or global notification.
/// When `global` is set, `user_id` is ignored for delivery and per-reader
/// read state lives in `read_by` instead of the scalar `read` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub related_id: Option<String>,
    pub read: bool,
    pub read_by: Vec<String>,
    pub global: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: String,
}
