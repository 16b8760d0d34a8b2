//! Runtime for executing GPA sessions
//!
//! Each active session gets its own actor task, so operations on one
//! session run strictly in order while different sessions run in parallel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{
    Command, ErrorKind, ReplyNote, SessionRequest, SessionRuntime, StepError, StepReply,
};
pub use traits::*;

use crate::config::AssistantConfig;
use crate::db::Database;
use crate::grading::{GradeScale, ScaleError};
use crate::state_machine::{CollectionPolicy, SessionContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = SessionRuntime<DatabaseSlotStore, DatabaseResultSink>;

/// How long an idle session actor lives before it is stopped
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Manager for all session runtimes
pub struct RuntimeManager {
    db: Database,
    policy: CollectionPolicy,
    scale: Arc<GradeScale>,
    persist_results: bool,
    idle_timeout: Duration,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
    next_generation: AtomicU64,
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub request_tx: mpsc::Sender<SessionRequest>,
    /// Distinguishes a restarted actor from the one it replaced
    generation: u64,
}

impl RuntimeManager {
    pub fn new(db: Database, config: &AssistantConfig) -> Result<Self, ScaleError> {
        Ok(Self {
            db,
            policy: config.policy(),
            scale: Arc::new(config.grade_scale()?),
            persist_results: config.persist_results,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        })
    }

    #[allow(dead_code)] // Used in tests
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Get or create the actor for a session
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(session_id) {
                if !handle.request_tx.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(session_id) {
            if !handle.request_tx.is_closed() {
                return handle.clone();
            }
        }

        let context = SessionContext::new(session_id, self.policy.clone(), self.scale.clone());
        let mut runtime: ProductionRuntime =
            SessionRuntime::new(context, DatabaseSlotStore::new(self.db.clone()));
        if self.persist_results {
            runtime = runtime.with_result_sink(DatabaseResultSink::new(self.db.clone()));
        }

        let (request_tx, request_rx) = mpsc::channel(32);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let idle_timeout = self.idle_timeout;
        let registry = Arc::clone(&self.sessions);
        let key = session_id.to_string();
        tokio::spawn(async move {
            runtime.run(request_rx, idle_timeout).await;

            // Drop our own entry unless a newer actor already took the slot
            let mut sessions = registry.write().await;
            if sessions
                .get(&key)
                .is_some_and(|handle| handle.generation == generation)
            {
                sessions.remove(&key);
            }
        });

        let handle = SessionHandle {
            request_tx,
            generation,
        };
        sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Run a command on a session and wait for its reply
    pub async fn dispatch(
        &self,
        session_id: &str,
        mut command: Command,
    ) -> Result<StepReply, StepError> {
        // A stopped actor is replaced once before giving up
        for _ in 0..2 {
            let handle = self.get_or_create(session_id).await;
            let (reply_tx, reply_rx) = oneshot::channel();
            match handle.request_tx.send(SessionRequest { command, reply_tx }).await {
                Ok(()) => {
                    return reply_rx.await.map_err(|_| {
                        StepError::Unavailable("session runtime dropped the request".to_string())
                    })?;
                }
                Err(mpsc::error::SendError(request)) => {
                    tracing::debug!(
                        session_id = %session_id,
                        "Session runtime stopped, restarting"
                    );
                    command = request.command;
                    self.evict(session_id, handle.generation).await;
                }
            }
        }
        Err(StepError::Unavailable(format!(
            "could not start a runtime for session {session_id}"
        )))
    }

    async fn evict(&self, session_id: &str, generation: u64) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(session_id)
            .is_some_and(|handle| handle.generation == generation)
        {
            sessions.remove(session_id);
        }
    }

    /// Number of sessions with a live actor
    #[allow(dead_code)] // Used in tests
    pub async fn active_sessions(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|handle| !handle.request_tx.is_closed())
            .count()
    }

    /// Number of sessions the manager still holds a handle for
    #[allow(dead_code)] // Used in tests
    pub async fn tracked_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Get the database handle
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the active grade scale
    pub fn scale(&self) -> &Arc<GradeScale> {
        &self.scale
    }
}
