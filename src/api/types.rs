//! API request and response types

use crate::db::GpaRun;
use crate::grading::GradeTier;
use crate::runtime::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw user answer for a count or credit prompt
#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    #[serde(default)]
    pub value: Value,
}

/// Raw user answer for a score prompt
#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub value: Value,
    /// Course the score belongs to; redelivery of a recorded index is ignored
    #[serde(default)]
    pub index: Option<u32>,
}

/// Response with stored GPA calculations
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub sender_id: String,
    pub runs: Vec<GpaRun>,
}

/// Response describing the active grade table
#[derive(Debug, Serialize)]
pub struct GradeScaleResponse {
    pub name: String,
    pub max_point: f64,
    pub tiers: Vec<GradeTier>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}
