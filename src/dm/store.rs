//! Message Store: durable append-only per-conversation log keyed by the
//! (sender, recipient) pair.
//!
//! Synchronous rusqlite access; async callers go through
//! tokio::task::spawn_blocking with the shared DbPool.

use rusqlite::Connection;

use crate::db::models::Message;

/// Append a message to the log.
pub fn insert(conn: &Connection, msg: &Message) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO messages (id, sender, recipient, body, file_ref, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            msg.id,
            msg.sender,
            msg.recipient,
            msg.text,
            msg.file,
            msg.read,
            msg.created_at
        ],
    )?;
    Ok(())
}

/// Chronological history for the unordered pair {a, b}.
/// Message ids are UUIDv7, so the id is the tie-breaker for equal timestamps.
pub fn history(conn: &Connection, a: &str, b: &str) -> rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, recipient, body, file_ref, read, created_at
         FROM messages
         WHERE (sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)
         ORDER BY created_at, id",
    )?;

    let messages = stmt
        .query_map(rusqlite::params![a, b], |row| {
            Ok(Message {
                id: row.get(0)?,
                sender: row.get(1)?,
                recipient: row.get(2)?,
                text: row.get(3)?,
                file: row.get(4)?,
                read: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(messages)
}

/// Flip read=true for all unread messages from `other` to `reader`.
/// Returns the number of rows updated; calling with nothing unread is a no-op.
pub fn mark_read(conn: &Connection, reader: &str, other: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE messages SET read = 1 WHERE sender = ?1 AND recipient = ?2 AND read = 0",
        rusqlite::params![other, reader],
    )
}
