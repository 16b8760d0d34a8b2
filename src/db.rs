//! Database module for the GPA assistant
//!
//! Persists session slots between dialogue turns and keeps a history of
//! finished GPA calculations per sender.

mod schema;

pub use schema::*;

use crate::gpa::Report;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    // ==================== Slot Operations ====================

    /// Read one slot; `None` when the slot was never written
    pub fn get_slot(&self, session_id: &str, key: &str) -> DbResult<Option<Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM slots WHERE session_id = ?1 AND key = ?2",
                params![session_id, key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    /// Write a batch of slots in one transaction, replacing previous values.
    /// Either every pair lands or none does.
    pub fn set_slots(&self, session_id: &str, pairs: &[(&str, Value)]) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO slots (session_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )?;
            for (key, value) in pairs {
                stmt.execute(params![session_id, key, value.to_string(), now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Drop every slot of a session
    pub fn clear_slots(&self, session_id: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM slots WHERE session_id = ?1", params![session_id])?;
        Ok(removed)
    }

    // ==================== User Operations ====================

    /// Get the user row for a sender, creating it on first use
    pub fn ensure_user(&self, sender_id: &str) -> DbResult<User> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (sender_id, created_at) VALUES (?1, ?2)",
            params![sender_id, Utc::now().to_rfc3339()],
        )?;

        conn.query_row(
            "SELECT id, sender_id, created_at FROM users WHERE sender_id = ?1",
            params![sender_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .map_err(DbError::from)
    }

    // ==================== GPA Run Operations ====================

    /// Store a finished calculation
    pub fn insert_gpa_run(&self, user: &User, scale: &str, report: &Report) -> DbResult<GpaRun> {
        let breakdown = serde_json::to_string(&report.entries)?;
        let now = Utc::now();
        #[allow(clippy::cast_possible_truncation)] // bounded by the course limit
        let course_count = report.entries.len() as u32;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO gpa_runs (user_id, scale, course_count, total_credits, total_points, gpa, breakdown, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                scale,
                course_count,
                report.total_credits,
                report.total_points,
                report.gpa,
                breakdown,
                now.to_rfc3339()
            ],
        )?;

        Ok(GpaRun {
            id: conn.last_insert_rowid(),
            sender_id: user.sender_id.clone(),
            scale: scale.to_string(),
            course_count,
            total_credits: report.total_credits,
            total_points: report.total_points,
            gpa: report.gpa,
            breakdown: report.entries.clone(),
            created_at: now,
        })
    }

    /// Stored calculations for a sender, newest first
    pub fn list_gpa_runs(&self, sender_id: &str) -> DbResult<Vec<GpaRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, u.sender_id, r.scale, r.course_count, r.total_credits, r.total_points,
                    r.gpa, r.breakdown, r.created_at
             FROM gpa_runs r JOIN users u ON u.id = r.user_id
             WHERE u.sender_id = ?1
             ORDER BY r.created_at DESC, r.id DESC",
        )?;

        let rows = stmt.query_map(params![sender_id], |row| {
            let breakdown: String = row.get(7)?;
            Ok(GpaRun {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                scale: row.get(2)?,
                course_count: row.get(3)?,
                total_credits: row.get(4)?,
                total_points: row.get(5)?,
                gpa: row.get(6)?,
                breakdown: serde_json::from_str(&breakdown).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e))
                })?,
                created_at: parse_datetime(&row.get::<_, String>(8)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
