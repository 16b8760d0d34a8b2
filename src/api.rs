//! HTTP API for the GPA assistant
//!
//! Action endpoints called by the dialogue framework, one per operation.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::AssistantConfig;
use crate::db::Database;
use crate::grading::ScaleError;
use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
}

impl AppState {
    pub fn new(db: Database, config: &AssistantConfig) -> Result<Self, ScaleError> {
        Ok(Self::from_runtime(RuntimeManager::new(db, config)?))
    }

    pub fn from_runtime(runtime: RuntimeManager) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }
}
