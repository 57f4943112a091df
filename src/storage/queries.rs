//! SQL queries over the `memory_records` table
//!
//! Every function takes a plain `&Connection`; callers choose whether it runs
//! inside a transaction via [`Storage::with_transaction`](super::Storage::with_transaction).

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, RetentionError};
use crate::types::{
    ContentDigest, ImportanceUpdate, MemoryId, MemoryKind, MemoryRecord, NewMemory, Visibility,
};

const RECORD_COLUMNS: &str = "id, owner_id, kind, importance, content_digest, created_at, \
     last_decay_at, last_accessed_at, access_count, visibility, topic_drift_count";

/// Fixed-width RFC 3339 so timestamps compare correctly as text
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn check_importance(importance: f32) -> Result<()> {
    if importance.is_finite() && (0.0..=1.0).contains(&importance) {
        Ok(())
    } else {
        Err(RetentionError::Validation(format!(
            "importance must be in [0.0, 1.0], got {}",
            importance
        )))
    }
}

/// Convert a database row to a MemoryRecord
pub fn record_from_row(row: &Row) -> rusqlite::Result<MemoryRecord> {
    let kind_str: String = row.get("kind")?;
    let digest_str: String = row.get("content_digest")?;
    let created_at: String = row.get("created_at")?;
    let last_decay_at: String = row.get("last_decay_at")?;
    let last_accessed_at: Option<String> = row.get("last_accessed_at")?;
    let visibility_str: String = row.get("visibility")?;

    let created_at = parse_timestamp(&created_at).unwrap_or_else(Utc::now);
    // An unreadable decay stamp restarts the decay clock from creation
    let last_decay_at = parse_timestamp(&last_decay_at).unwrap_or(created_at);

    Ok(MemoryRecord {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        content_digest: serde_json::from_str::<ContentDigest>(&digest_str).unwrap_or_default(),
        memory_kind: kind_str.parse().unwrap_or(MemoryKind::Conversation),
        importance: row.get("importance")?,
        created_at,
        last_decay_at,
        last_accessed_at: last_accessed_at.as_deref().and_then(parse_timestamp),
        access_count: row.get("access_count")?,
        visibility: visibility_str.parse().unwrap_or(Visibility::Private),
        topic_drift_count: row.get("topic_drift_count")?,
    })
}

/// Insert a new memory; `last_decay_at` starts at the creation time
pub fn insert_memory(conn: &Connection, input: &NewMemory) -> Result<MemoryRecord> {
    check_importance(input.importance)?;
    if input.owner_id.trim().is_empty() {
        return Err(RetentionError::Validation(
            "owner_id must not be empty".to_string(),
        ));
    }

    let created_at = input.created_at.unwrap_or_else(Utc::now);
    let stamp = format_timestamp(&created_at);
    let digest = serde_json::to_string(&input.content_digest)?;

    conn.execute(
        "INSERT INTO memory_records
            (owner_id, kind, importance, content_digest, created_at, last_decay_at,
             visibility, topic_drift_count)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            input.owner_id,
            input.memory_kind.as_str(),
            input.importance,
            digest,
            stamp,
            stamp,
            input.visibility.as_str(),
            input.topic_drift_count,
        ],
    )?;

    get_memory(conn, conn.last_insert_rowid())
}

pub fn get_memory(conn: &Connection, id: MemoryId) -> Result<MemoryRecord> {
    conn.query_row(
        &format!("SELECT {} FROM memory_records WHERE id = ?", RECORD_COLUMNS),
        params![id],
        record_from_row,
    )
    .optional()?
    .ok_or(RetentionError::NotFound(id))
}

pub fn owner_memories(conn: &Connection, owner_id: &str) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM memory_records WHERE owner_id = ? ORDER BY id",
        RECORD_COLUMNS
    ))?;
    let records = stmt
        .query_map(params![owner_id], record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Records whose last decay is at or before `due_before`
pub fn decay_candidates(
    conn: &Connection,
    owner_id: &str,
    due_before: &DateTime<Utc>,
) -> Result<Vec<MemoryRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM memory_records
         WHERE owner_id = ? AND last_decay_at <= ?
         ORDER BY id",
        RECORD_COLUMNS
    ))?;
    let records = stmt
        .query_map(
            params![owner_id, format_timestamp(due_before)],
            record_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn list_owners(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT owner_id FROM memory_records ORDER BY owner_id")?;
    let owners = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(owners)
}

pub fn count_owner(conn: &Connection, owner_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_records WHERE owner_id = ?",
        params![owner_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Write decayed scores for one owner. Records that vanished since they were
/// read are skipped; the number actually updated is returned.
pub fn apply_decay_batch(
    conn: &Connection,
    owner_id: &str,
    updates: &[ImportanceUpdate],
) -> Result<usize> {
    let mut stmt = conn.prepare(
        "UPDATE memory_records SET importance = ?, last_decay_at = ?
         WHERE id = ? AND owner_id = ?",
    )?;
    let mut written = 0;
    for update in updates {
        check_importance(update.importance)?;
        written += stmt.execute(params![
            update.importance,
            format_timestamp(&update.last_decay_at),
            update.id,
            owner_id,
        ])?;
    }
    Ok(written)
}

/// Delete records belonging to `owner_id`. Fails on any id the owner does
/// not hold, so the surrounding transaction removes nothing.
pub fn delete_records(conn: &Connection, owner_id: &str, ids: &[MemoryId]) -> Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM memory_records WHERE id = ? AND owner_id = ?")?;
    for id in ids {
        if stmt.execute(params![id, owner_id])? == 0 {
            return Err(RetentionError::Validation(format!(
                "memory {} does not belong to owner '{}'",
                id, owner_id
            )));
        }
    }
    Ok(ids.len())
}

pub fn record_access(conn: &Connection, id: MemoryId, at: &DateTime<Utc>) -> Result<()> {
    let updated = conn.execute(
        "UPDATE memory_records
         SET access_count = access_count + 1, last_accessed_at = ?
         WHERE id = ?",
        params![format_timestamp(at), id],
    )?;
    if updated == 0 {
        return Err(RetentionError::NotFound(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use chrono::Duration;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn new_memory(owner: &str, importance: f32) -> NewMemory {
        NewMemory {
            owner_id: owner.to_string(),
            content_digest: ContentDigest {
                text_length: 5,
                keywords: vec!["secret".to_string()],
                exclamation_count: 1,
                caps_ratio: 0.2,
                snippet: Some("hello".to_string()),
            },
            memory_kind: MemoryKind::Secret,
            importance,
            visibility: Visibility::Shared,
            topic_drift_count: 3,
            created_at: None,
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let conn = conn();
        let record = insert_memory(&conn, &new_memory("aria", 0.7)).unwrap();
        assert_eq!(record.owner_id, "aria");
        assert_eq!(record.memory_kind, MemoryKind::Secret);
        assert_eq!(record.visibility, Visibility::Shared);
        assert_eq!(record.topic_drift_count, 3);
        assert_eq!(record.content_digest.keywords, vec!["secret".to_string()]);
        assert_eq!(record.last_decay_at, record.created_at);
        assert_eq!(record.access_count, 0);
        assert!(record.last_accessed_at.is_none());
    }

    #[test]
    fn test_insert_rejects_bad_input() {
        let conn = conn();
        assert!(insert_memory(&conn, &new_memory("aria", 1.5)).is_err());
        assert!(insert_memory(&conn, &new_memory("  ", 0.5)).is_err());
    }

    #[test]
    fn test_decay_candidates_respect_gap() {
        let conn = conn();
        let now = Utc::now();
        let mut old = new_memory("aria", 0.7);
        old.created_at = Some(now - Duration::hours(3));
        let old = insert_memory(&conn, &old).unwrap();
        insert_memory(&conn, &new_memory("aria", 0.7)).unwrap();

        let due = decay_candidates(&conn, "aria", &(now - Duration::hours(1))).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, old.id);
    }

    #[test]
    fn test_delete_rejects_foreign_ids() {
        let conn = conn();
        let a = insert_memory(&conn, &new_memory("aria", 0.3)).unwrap();
        let b = insert_memory(&conn, &new_memory("bram", 0.3)).unwrap();

        assert!(delete_records(&conn, "aria", &[b.id]).is_err());
        assert_eq!(delete_records(&conn, "aria", &[a.id]).unwrap(), 1);
        assert_eq!(count_owner(&conn, "aria").unwrap(), 0);
        assert_eq!(count_owner(&conn, "bram").unwrap(), 1);
    }

    #[test]
    fn test_record_access() {
        let conn = conn();
        let record = insert_memory(&conn, &new_memory("aria", 0.5)).unwrap();
        let at = Utc::now();
        record_access(&conn, record.id, &at).unwrap();
        record_access(&conn, record.id, &at).unwrap();
        let record = get_memory(&conn, record.id).unwrap();
        assert_eq!(record.access_count, 2);
        assert!(record.last_accessed_at.is_some());
        assert!(matches!(
            record_access(&conn, 999, &at),
            Err(RetentionError::NotFound(999))
        ));
    }

    #[test]
    fn test_list_owners() {
        let conn = conn();
        insert_memory(&conn, &new_memory("bram", 0.5)).unwrap();
        insert_memory(&conn, &new_memory("aria", 0.5)).unwrap();
        insert_memory(&conn, &new_memory("aria", 0.5)).unwrap();
        assert_eq!(list_owners(&conn).unwrap(), vec!["aria", "bram"]);
    }
}
