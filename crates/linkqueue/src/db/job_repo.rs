//! Job repository: CRUD operations for the `jobs` table.
//!
//! Filterable fields live in their own columns; the full job is stored as a
//! JSON payload.

use rusqlite::{params, Connection, Row};

use super::{format_timestamp, Database, DatabaseError};
use crate::job::Job;

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub priority: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub payload: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
            payload: row.get("payload")?,
        })
    }

    pub fn from_job(job: &Job) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: job.id.clone(),
            owner_id: job.owner_id.clone(),
            status: job.status.as_str().to_string(),
            priority: job.priority.as_str().to_string(),
            created_at: format_timestamp(job.created_at),
            updated_at: format_timestamp(job.updated_at),
            completed_at: job.completed_at.map(format_timestamp),
            payload: serde_json::to_string(job)?,
        })
    }

    pub fn into_job(self) -> Result<Job, DatabaseError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

fn upsert_on(conn: &Connection, row: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, owner_id, status, priority, created_at, updated_at,
         completed_at, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET owner_id=excluded.owner_id, status=excluded.status,
         priority=excluded.priority, updated_at=excluded.updated_at,
         completed_at=excluded.completed_at, payload=excluded.payload",
        params![
            row.id,
            row.owner_id,
            row.status,
            row.priority,
            row.created_at,
            row.updated_at,
            row.completed_at,
            row.payload,
        ],
    )?;
    Ok(())
}

/// Inserts a job row or overwrites the existing one with the same id.
pub fn upsert(db: &Database, row: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| upsert_on(conn, row))
}

/// Replaces the whole table with `rows` in one transaction.
pub fn replace_all(db: &Database, rows: &[JobRow]) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM jobs", [])?;
        for row in rows {
            upsert_on(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns every row, oldest first.
pub fn load_all(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY created_at ASC, id ASC")?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Queries jobs with filters, newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push(format!("owner_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(owner_id.clone()));
        }
        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref priority) = filter.priority {
            conditions.push(format!("priority = ?{}", param_values.len() + 1));
            param_values.push(Box::new(priority.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.map_or(-1, |l| l as i64);
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC, id ASC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Deletes the given ids, returning how many rows were removed.
pub fn delete_many(db: &Database, ids: &[String]) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM jobs WHERE id = ?1")?;
            for id in ids {
                removed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    })
}

/// Returns a map of status → count.
pub fn count_by_status(db: &Database) -> Result<Vec<(String, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
