//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the session runtime with in-memory doubles.

use crate::gpa::Report;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Key-value slot storage owned by the dialogue framework
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Read one slot; `None` when it was never written
    async fn get_slot(&self, session_id: &str, key: &str) -> Result<Option<Value>, String>;

    /// Write several slots as one unit; on error none of them is applied
    async fn set_slots(&self, session_id: &str, pairs: &[(&str, Value)]) -> Result<(), String>;

    /// Drop every slot of a session
    async fn clear_slots(&self, session_id: &str) -> Result<(), String>;
}

/// Who produced a report and under which scale
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub sender_id: String,
    pub scale: String,
    pub completed_at: DateTime<Utc>,
}

/// Best-effort sink for finished reports
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, report: &Report, metadata: &SessionMetadata) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SlotStore + ?Sized> SlotStore for Arc<T> {
    async fn get_slot(&self, session_id: &str, key: &str) -> Result<Option<Value>, String> {
        (**self).get_slot(session_id, key).await
    }

    async fn set_slots(&self, session_id: &str, pairs: &[(&str, Value)]) -> Result<(), String> {
        (**self).set_slots(session_id, pairs).await
    }

    async fn clear_slots(&self, session_id: &str) -> Result<(), String> {
        (**self).clear_slots(session_id).await
    }
}

#[async_trait]
impl<T: ResultSink + ?Sized> ResultSink for Arc<T> {
    async fn persist(&self, report: &Report, metadata: &SessionMetadata) -> Result<(), String> {
        (**self).persist(report, metadata).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::Database;

/// Adapter to use Database as the slot store
#[derive(Clone)]
pub struct DatabaseSlotStore {
    db: Database,
}

impl DatabaseSlotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SlotStore for DatabaseSlotStore {
    async fn get_slot(&self, session_id: &str, key: &str) -> Result<Option<Value>, String> {
        self.db.get_slot(session_id, key).map_err(|e| e.to_string())
    }

    async fn set_slots(&self, session_id: &str, pairs: &[(&str, Value)]) -> Result<(), String> {
        self.db
            .set_slots(session_id, pairs)
            .map_err(|e| e.to_string())
    }

    async fn clear_slots(&self, session_id: &str) -> Result<(), String> {
        self.db
            .clear_slots(session_id)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Adapter to record finished reports in the run history
#[derive(Clone)]
pub struct DatabaseResultSink {
    db: Database,
}

impl DatabaseResultSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultSink for DatabaseResultSink {
    async fn persist(&self, report: &Report, metadata: &SessionMetadata) -> Result<(), String> {
        let user = self
            .db
            .ensure_user(&metadata.sender_id)
            .map_err(|e| e.to_string())?;
        self.db
            .insert_gpa_run(&user, &metadata.scale, report)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
