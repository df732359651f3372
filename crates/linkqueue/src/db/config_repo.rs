//! Persisted queue configuration (single row).

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{format_timestamp, Database, DatabaseError};
use crate::config::QueueConfig;

pub fn load(db: &Database) -> Result<Option<QueueConfig>, DatabaseError> {
    let payload: Option<String> = db.with_conn(|conn| {
        Ok(conn
            .query_row("SELECT payload FROM queue_config WHERE id = 1", [], |r| {
                r.get(0)
            })
            .optional()?)
    })?;

    match payload {
        Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

pub fn save(db: &Database, config: &QueueConfig) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(config)?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO queue_config (id, payload, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET payload=excluded.payload, updated_at=excluded.updated_at",
            params![payload, format_timestamp(Utc::now())],
        )?;
        Ok(())
    })
}
