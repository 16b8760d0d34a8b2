//! In-memory test doubles for the session runtime
//!
//! These doubles enable runtime testing without a database.

use super::traits::*;
use crate::gpa::Report;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// In-Memory Slot Store
// ============================================================================

/// Slot store backed by a hash map
#[derive(Default)]
pub struct InMemorySlotStore {
    slots: Mutex<HashMap<(String, String), Value>>,
    fail_writes: AtomicBool,
    reject_key: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Reject any batch that touches `key`, applying none of it
    pub fn reject_key(&self, key: Option<&str>) {
        *self.reject_key.lock().unwrap() = key.map(str::to_string);
    }

    /// Overwrite a slot directly, bypassing the runtime
    pub fn put(&self, session_id: &str, key: &str, value: Value) {
        self.slots
            .lock()
            .unwrap()
            .insert((session_id.to_string(), key.to_string()), value);
    }

    pub fn value(&self, session_id: &str, key: &str) -> Option<Value> {
        self.slots
            .lock()
            .unwrap()
            .get(&(session_id.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of slots held for a session
    pub fn slot_count(&self, session_id: &str) -> usize {
        self.slots
            .lock()
            .unwrap()
            .keys()
            .filter(|(sid, _)| sid == session_id)
            .count()
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn get_slot(&self, session_id: &str, key: &str) -> Result<Option<Value>, String> {
        Ok(self.value(session_id, key))
    }

    async fn set_slots(&self, session_id: &str, pairs: &[(&str, Value)]) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("slot store unavailable".to_string());
        }
        if let Some(rejected) = self.reject_key.lock().unwrap().as_deref() {
            if pairs.iter().any(|(key, _)| *key == rejected) {
                return Err(format!("write to {rejected} rejected"));
            }
        }
        let mut slots = self.slots.lock().unwrap();
        for (key, value) in pairs {
            slots.insert((session_id.to_string(), (*key).to_string()), value.clone());
        }
        Ok(())
    }

    async fn clear_slots(&self, session_id: &str) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("slot store unavailable".to_string());
        }
        self.slots
            .lock()
            .unwrap()
            .retain(|(sid, _), _| sid != session_id);
        Ok(())
    }
}

// ============================================================================
// Result Sinks
// ============================================================================

/// Result sink that keeps every report it is given
#[derive(Default)]
pub struct RecordingResultSink {
    pub records: Mutex<Vec<(Report, SessionMetadata)>>,
}

impl RecordingResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<(Report, SessionMetadata)> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingResultSink {
    async fn persist(&self, report: &Report, metadata: &SessionMetadata) -> Result<(), String> {
        self.records
            .lock()
            .unwrap()
            .push((report.clone(), metadata.clone()));
        Ok(())
    }
}

/// Result sink that always fails
pub struct FailingResultSink;

#[async_trait]
impl ResultSink for FailingResultSink {
    async fn persist(&self, _report: &Report, _metadata: &SessionMetadata) -> Result<(), String> {
        Err("results database is read-only".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssistantConfig;
    use crate::db::Database;
    use crate::grading::GradeScale;
    use crate::runtime::{Command, ErrorKind, RuntimeManager, SessionRuntime, StepError};
    use crate::state_machine::slots::{SLOT_CURRENT_INDEX, SLOT_ENTRIES, SLOT_EXPECTED_COUNT};
    use crate::state_machine::{CollectionPolicy, CollectionState, SessionContext};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const SESSION: &str = "session-1";

    fn test_context() -> SessionContext {
        SessionContext::new(
            SESSION,
            CollectionPolicy::default(),
            Arc::new(GradeScale::plus_minus()),
        )
    }

    fn runtime_with(
        slots: Arc<InMemorySlotStore>,
        sink: Arc<RecordingResultSink>,
    ) -> SessionRuntime<Arc<InMemorySlotStore>, Arc<RecordingResultSink>> {
        SessionRuntime::new(test_context(), slots).with_result_sink(sink)
    }

    fn start(raw: Value) -> Command {
        Command::Start { raw }
    }

    fn credit(raw: Value) -> Command {
        Command::SupplyCredit { raw }
    }

    fn score(raw: Value) -> Command {
        Command::SupplyScore { raw, index: None }
    }

    #[tokio::test]
    async fn test_in_memory_slot_store() {
        let store = InMemorySlotStore::new();
        store.set_slots("a", &[("k", json!(1))]).await.unwrap();
        store.set_slots("b", &[("k", json!(2))]).await.unwrap();
        assert_eq!(store.get_slot("a", "k").await.unwrap(), Some(json!(1)));

        store.clear_slots("a").await.unwrap();
        assert_eq!(store.get_slot("a", "k").await.unwrap(), None);
        assert_eq!(store.slot_count("b"), 1);

        store.fail_writes(true);
        assert!(store.set_slots("a", &[("k", json!(3))]).await.is_err());
    }

    #[tokio::test]
    async fn test_full_session_produces_report() {
        let slots = Arc::new(InMemorySlotStore::new());
        let sink = Arc::new(RecordingResultSink::new());
        let runtime = runtime_with(slots.clone(), sink.clone());

        let reply = runtime.process(start(json!("2"))).await.unwrap();
        assert!(reply.accepted);
        assert_eq!(reply.prompt, "Course 1: how many credits? (e.g. 3)");
        assert_eq!(slots.value(SESSION, SLOT_EXPECTED_COUNT), Some(json!(2)));
        assert_eq!(slots.value(SESSION, SLOT_CURRENT_INDEX), Some(json!(1)));

        runtime.process(credit(json!("3 кредит"))).await.unwrap();
        runtime.process(score(json!("95%"))).await.unwrap();
        runtime.process(credit(json!(4))).await.unwrap();
        let reply = runtime.process(score(json!(70))).await.unwrap();

        assert!(reply.accepted);
        assert!(matches!(reply.state, CollectionState::Complete { .. }));
        let report = reply.report.expect("report delivered");
        assert!((report.total_credits - 7.0).abs() < 1e-9);
        assert!((report.gpa_rounded() - 2.69).abs() < 1e-9);
        assert!(reply.report_text.unwrap().ends_with("GPA: 2.69"));
        assert!(reply.advisory.is_none());

        // Slots are cleared and the result recorded
        assert_eq!(slots.slot_count(SESSION), 0);
        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1.sender_id, SESSION);
        assert_eq!(recorded[0].1.scale, "plus_minus");
    }

    #[tokio::test]
    async fn test_unreadable_input_reprompts() {
        let slots = Arc::new(InMemorySlotStore::new());
        let runtime = runtime_with(slots.clone(), Arc::new(RecordingResultSink::new()));

        let reply = runtime.process(start(json!("a few"))).await.unwrap();
        assert!(!reply.accepted);
        assert_eq!(reply.error.unwrap().kind, ErrorKind::InvalidFormat);
        assert_eq!(reply.state, CollectionState::AwaitingCount);
        assert!(reply.prompt.contains("How many courses"));
        assert_eq!(slots.slot_count(SESSION), 0);
    }

    #[tokio::test]
    async fn test_range_errors_keep_state() {
        let slots = Arc::new(InMemorySlotStore::new());
        let runtime = runtime_with(slots.clone(), Arc::new(RecordingResultSink::new()));

        for raw in [json!(0), json!(-1), json!("51")] {
            let reply = runtime.process(start(raw)).await.unwrap();
            assert_eq!(reply.error.unwrap().kind, ErrorKind::InvalidCount);
            assert_eq!(reply.state, CollectionState::AwaitingCount);
        }

        runtime.process(start(json!(1))).await.unwrap();
        let reply = runtime.process(credit(json!(35))).await.unwrap();
        assert_eq!(reply.error.unwrap().kind, ErrorKind::InvalidCredit);
        assert_eq!(reply.prompt, "Course 1: how many credits? (e.g. 3)");

        runtime.process(credit(json!(3))).await.unwrap();
        for raw in [json!("-5"), json!(101)] {
            let reply = runtime.process(score(raw)).await.unwrap();
            assert_eq!(reply.error.unwrap().kind, ErrorKind::InvalidScore);
            assert_eq!(reply.state.pending_credit(), Some(3.0));
        }
    }

    #[tokio::test]
    async fn test_out_of_sequence_is_an_error() {
        let runtime = runtime_with(
            Arc::new(InMemorySlotStore::new()),
            Arc::new(RecordingResultSink::new()),
        );

        let err = runtime.process(score(json!(90))).await.unwrap_err();
        assert_eq!(
            err,
            StepError::OutOfSequence {
                state: "awaiting_count",
                event: "score_supplied"
            }
        );

        // Unreadable input for the wrong step is still a sequencing fault
        let err = runtime.process(credit(json!("lots"))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfSequence);
    }

    #[tokio::test]
    async fn test_duplicate_score_delivery() {
        let sink = Arc::new(RecordingResultSink::new());
        let runtime = runtime_with(Arc::new(InMemorySlotStore::new()), sink);

        runtime.process(start(json!(3))).await.unwrap();
        runtime.process(credit(json!(3))).await.unwrap();
        let first = runtime
            .process(Command::SupplyScore {
                raw: json!(88),
                index: Some(1),
            })
            .await
            .unwrap();
        let again = runtime
            .process(Command::SupplyScore {
                raw: json!(40),
                index: Some(1),
            })
            .await
            .unwrap();

        assert!(again.accepted);
        assert!(again.duplicate);
        assert_eq!(again.state, first.state);
        assert_eq!(again.state.entries().len(), 1);
        assert!((again.state.entries()[0].score - 88.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_persistence_failure_is_advisory() {
        let runtime = SessionRuntime::new(test_context(), Arc::new(InMemorySlotStore::new()))
            .with_result_sink(FailingResultSink);

        runtime.process(start(json!(1))).await.unwrap();
        runtime.process(credit(json!(2))).await.unwrap();
        let reply = runtime.process(score(json!(91))).await.unwrap();

        assert!(reply.accepted);
        assert!(reply.report.is_some());
        let advisory = reply.advisory.expect("advisory attached");
        assert_eq!(advisory.kind, ErrorKind::PersistenceFailure);
        assert!(advisory.message.contains("read-only"));
    }

    #[tokio::test]
    async fn test_runtime_without_sink_still_reports() {
        let runtime: SessionRuntime<_, FailingResultSink> =
            SessionRuntime::new(test_context(), Arc::new(InMemorySlotStore::new()));

        runtime.process(start(json!(1))).await.unwrap();
        runtime.process(credit(json!(2))).await.unwrap();
        let reply = runtime.process(score(json!(91))).await.unwrap();
        assert!(reply.report.is_some());
        assert!(reply.advisory.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_slots_restart_session() {
        let slots = Arc::new(InMemorySlotStore::new());
        slots.put(SESSION, SLOT_EXPECTED_COUNT, json!(2));
        slots.put(SESSION, SLOT_ENTRIES, json!("not a list"));
        let runtime = runtime_with(slots.clone(), Arc::new(RecordingResultSink::new()));

        let reply = runtime.process(Command::Inspect).await.unwrap();
        assert_eq!(reply.state, CollectionState::AwaitingCount);
        assert_eq!(slots.slot_count(SESSION), 0);
    }

    #[tokio::test]
    async fn test_slot_write_failure_surfaces() {
        let slots = Arc::new(InMemorySlotStore::new());
        let runtime = runtime_with(slots.clone(), Arc::new(RecordingResultSink::new()));
        slots.fail_writes(true);

        let err = runtime.process(start(json!(2))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_rejected_slot_batch_keeps_session() {
        let slots = Arc::new(InMemorySlotStore::new());
        let runtime = runtime_with(slots.clone(), Arc::new(RecordingResultSink::new()));

        runtime.process(start(json!(3))).await.unwrap();
        runtime.process(credit(json!(3))).await.unwrap();
        runtime.process(score(json!(90))).await.unwrap();
        runtime.process(credit(json!(4))).await.unwrap();

        slots.reject_key(Some(SLOT_ENTRIES));
        let err = runtime.process(score(json!(75))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        slots.reject_key(None);

        // None of the batch landed, so the session resumes where it was
        let reply = runtime.process(Command::Inspect).await.unwrap();
        assert_eq!(reply.state.expected_count(), Some(3));
        assert_eq!(reply.state.entries().len(), 1);
        assert_eq!(reply.state.current_index(), Some(2));
        assert_eq!(reply.state.pending_credit(), Some(4.0));

        let reply = runtime.process(score(json!(75))).await.unwrap();
        assert!(reply.accepted);
        assert_eq!(reply.state.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_progress() {
        let slots = Arc::new(InMemorySlotStore::new());
        let runtime = runtime_with(slots.clone(), Arc::new(RecordingResultSink::new()));

        runtime.process(start(json!(2))).await.unwrap();
        runtime.process(credit(json!(3))).await.unwrap();
        let reply = runtime.process(Command::Reset).await.unwrap();

        assert_eq!(reply.state, CollectionState::AwaitingCount);
        assert_eq!(slots.slot_count(SESSION), 0);
    }

    // ------------------------------------------------------------------------
    // RuntimeManager
    // ------------------------------------------------------------------------

    fn test_manager() -> RuntimeManager {
        let db = Database::open_in_memory().unwrap();
        RuntimeManager::new(db, &AssistantConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_manager_isolates_sessions() {
        let manager = test_manager();

        manager.dispatch("a", start(json!(2))).await.unwrap();
        manager.dispatch("b", start(json!(5))).await.unwrap();
        manager.dispatch("a", credit(json!(3))).await.unwrap();

        let a = manager.dispatch("a", Command::Inspect).await.unwrap();
        let b = manager.dispatch("b", Command::Inspect).await.unwrap();
        assert_eq!(a.state.pending_credit(), Some(3.0));
        assert_eq!(b.state.expected_count(), Some(5));
        assert_eq!(b.state.pending_credit(), None);
        assert_eq!(manager.active_sessions().await, 2);
    }

    #[tokio::test]
    async fn test_manager_persists_history() {
        let manager = test_manager();

        manager.dispatch("alice", start(json!(1))).await.unwrap();
        manager.dispatch("alice", credit(json!(4))).await.unwrap();
        let reply = manager.dispatch("alice", score(json!(85))).await.unwrap();
        assert!(reply.report.is_some());

        let runs = manager.db().list_gpa_runs("alice").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].course_count, 1);
    }

    #[tokio::test]
    async fn test_manager_serializes_concurrent_calls() {
        let manager = Arc::new(test_manager());
        manager.dispatch("s", start(json!(10))).await.unwrap();

        // Only one of the concurrent credits can land; the rest are out of sequence
        let mut tasks = Vec::new();
        for _ in 0..5 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.dispatch("s", credit(json!(3))).await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_idle_session_restarts_with_state() {
        let db = Database::open_in_memory().unwrap();
        let manager = RuntimeManager::new(db, &AssistantConfig::default())
            .unwrap()
            .with_idle_timeout(Duration::from_millis(20));

        manager.dispatch("s", start(json!(2))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.active_sessions().await, 0);

        let reply = manager.dispatch("s", credit(json!(3))).await.unwrap();
        assert!(reply.accepted);
        assert_eq!(reply.state.pending_credit(), Some(3.0));
    }

    #[tokio::test]
    async fn test_idle_sessions_leave_the_registry() {
        let db = Database::open_in_memory().unwrap();
        let manager = RuntimeManager::new(db, &AssistantConfig::default())
            .unwrap()
            .with_idle_timeout(Duration::from_millis(10));

        for i in 0..200 {
            manager
                .dispatch(&format!("s{i}"), start(json!(2)))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.tracked_sessions().await, 0);
    }
}
