//! Database schema and record types

use crate::state_machine::CourseEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS slots (
    session_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (session_id, key)
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gpa_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    scale TEXT NOT NULL,
    course_count INTEGER NOT NULL,
    total_credits REAL NOT NULL,
    total_points REAL NOT NULL,
    gpa REAL NOT NULL,
    breakdown TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_gpa_runs_user ON gpa_runs(user_id, created_at DESC);
";

/// A person talking to the assistant, keyed by the dialogue sender id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub sender_id: String,
    pub created_at: DateTime<Utc>,
}

/// One stored GPA calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpaRun {
    pub id: i64,
    pub sender_id: String,
    pub scale: String,
    pub course_count: u32,
    pub total_credits: f64,
    pub total_points: f64,
    pub gpa: f64,
    pub breakdown: Vec<CourseEntry>,
    pub created_at: DateTime<Utc>,
}
