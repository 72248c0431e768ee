//! Notification Store: durable records keyed by target user or flagged
//! global. The `read_by` column holds a JSON array of reader identities and
//! carries the read state for global records.

use rusqlite::{Connection, OptionalExtension};

use crate::db::models::Notification;

/// Insert a new notification record.
pub fn insert(conn: &Connection, n: &Notification) -> rusqlite::Result<()> {
    let read_by = serde_json::to_string(&n.read_by).unwrap_or_else(|_| "[]".to_string());
    let metadata = n.metadata.as_ref().map(|m| m.to_string());
    conn.execute(
        "INSERT INTO notifications
         (id, user_id, kind, title, body, related_id, read, read_by, is_global, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            n.id,
            n.user_id,
            n.kind,
            n.title,
            n.body,
            n.related_id,
            n.read,
            read_by,
            n.global,
            metadata,
            n.created_at
        ],
    )?;
    Ok(())
}

/// Personal records for `user_id` plus every global record, newest first.
pub fn list_for_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, title, body, related_id, read, read_by, is_global, metadata, created_at
         FROM notifications
         WHERE user_id = ?1 OR is_global = 1
         ORDER BY created_at DESC, id DESC",
    )?;

    let notifications = stmt
        .query_map(rusqlite::params![user_id], row_to_notification)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(notifications)
}

/// Look up a single record by id.
pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Notification>> {
    conn.query_row(
        "SELECT id, user_id, kind, title, body, related_id, read, read_by, is_global, metadata, created_at
         FROM notifications
         WHERE id = ?1",
        rusqlite::params![id],
        row_to_notification,
    )
    .optional()
}

/// Mark a record read for `reader`. Personal records flip the read flag;
/// global records append the reader to read_by. Idempotent. Returns the
/// updated record, or None if it does not exist.
pub fn mark_read(
    conn: &Connection,
    id: &str,
    reader: &str,
) -> rusqlite::Result<Option<Notification>> {
    let Some(mut n) = get(conn, id)? else {
        return Ok(None);
    };

    if n.global {
        if !n.read_by.iter().any(|r| r == reader) {
            n.read_by.push(reader.to_string());
            let read_by = serde_json::to_string(&n.read_by).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "UPDATE notifications SET read_by = ?1 WHERE id = ?2",
                rusqlite::params![read_by, id],
            )?;
        }
    } else if !n.read {
        n.read = true;
        conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            rusqlite::params![id],
        )?;
    }

    Ok(Some(n))
}

/// Delete a record. Returns the deleted record so the caller can target the
/// removal fan-out, or None if it does not exist.
pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<Option<Notification>> {
    let Some(n) = get(conn, id)? else {
        return Ok(None);
    };
    conn.execute(
        "DELETE FROM notifications WHERE id = ?1",
        rusqlite::params![id],
    )?;
    Ok(Some(n))
}

fn row_to_notification(row: &rusqlite::Row) -> rusqlite::Result<Notification> {
    let read_by_json: String = row.get(7)?;
    let metadata_json: Option<String> = row.get(9)?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        related_id: row.get(5)?,
        read: row.get(6)?,
        read_by: serde_json::from_str(&read_by_json).unwrap_or_default(),
        global: row.get(8)?,
        metadata: metadata_json.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get(10)?,
    })
}
