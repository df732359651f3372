//! Metrics history: an append-only, length-bounded table of snapshots.

use rusqlite::params;

use super::{format_timestamp, Database, DatabaseError};
use crate::metrics::QueueMetrics;

/// Appends a snapshot and evicts the oldest rows beyond `max_len`.
pub fn append(db: &Database, snapshot: &QueueMetrics, max_len: usize) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(snapshot)?;
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO metrics_history (recorded_at, payload) VALUES (?1, ?2)",
            params![format_timestamp(snapshot.timestamp), payload],
        )?;
        let evicted = tx.execute(
            "DELETE FROM metrics_history WHERE id NOT IN (
                SELECT id FROM metrics_history ORDER BY id DESC LIMIT ?1
             )",
            params![max_len as i64],
        )?;
        tx.commit()?;
        if evicted > 0 {
            log::debug!("Evicted {} metrics snapshots", evicted);
        }
        Ok(())
    })
}

/// Returns the stored snapshots, oldest first.
pub fn load_all(db: &Database) -> Result<Vec<QueueMetrics>, DatabaseError> {
    let payloads: Vec<String> = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT payload FROM metrics_history ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    payloads
        .iter()
        .map(|p| serde_json::from_str(p).map_err(DatabaseError::from))
        .collect()
}
