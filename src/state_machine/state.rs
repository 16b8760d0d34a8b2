//! Collection state types

use crate::grading::{Grade, GradeScale};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default upper bound on the number of courses in one session
pub const DEFAULT_MAX_COURSES: u32 = 50;

/// Default upper bound on a single course's credit hours
pub const DEFAULT_MAX_CREDIT: f64 = 30.0;

// ============================================================================
// Course Entry
// ============================================================================

/// One completed course: credit hours, score and the grade derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseEntry {
    /// 1-based position in collection order
    pub index: u32,
    pub credit: f64,
    pub score: f64,
    pub letter: String,
    pub point: f64,
}

impl CourseEntry {
    pub fn new(index: u32, credit: f64, score: f64, grade: Grade) -> Self {
        Self {
            index,
            credit,
            score,
            letter: grade.letter,
            point: grade.point,
        }
    }

    /// Credit-weighted grade points
    pub fn weighted_points(&self) -> f64 {
        self.credit * self.point
    }
}

// ============================================================================
// Collection State
// ============================================================================

/// Where a GPA session is in the credit/score collection cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionState {
    /// No session in progress, waiting for the number of courses
    #[default]
    AwaitingCount,

    /// Waiting for the credit hours of course `entries.len() + 1`
    AwaitingCredit {
        expected_count: u32,
        entries: Vec<CourseEntry>,
    },

    /// Credit accepted, waiting for the score of course `entries.len() + 1`
    AwaitingScore {
        expected_count: u32,
        pending_credit: f64,
        entries: Vec<CourseEntry>,
    },

    /// All courses collected
    Complete {
        expected_count: u32,
        entries: Vec<CourseEntry>,
    },
}

impl CollectionState {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            CollectionState::AwaitingCount => "awaiting_count",
            CollectionState::AwaitingCredit { .. } => "awaiting_credit",
            CollectionState::AwaitingScore { .. } => "awaiting_score",
            CollectionState::Complete { .. } => "complete",
        }
    }

    pub fn expected_count(&self) -> Option<u32> {
        match self {
            CollectionState::AwaitingCount => None,
            CollectionState::AwaitingCredit { expected_count, .. }
            | CollectionState::AwaitingScore { expected_count, .. }
            | CollectionState::Complete { expected_count, .. } => Some(*expected_count),
        }
    }

    pub fn entries(&self) -> &[CourseEntry] {
        match self {
            CollectionState::AwaitingCount => &[],
            CollectionState::AwaitingCredit { entries, .. }
            | CollectionState::AwaitingScore { entries, .. }
            | CollectionState::Complete { entries, .. } => entries,
        }
    }

    /// Index of the course being collected.
    ///
    /// Always `entries.len() + 1`; equals `expected_count + 1` once complete.
    pub fn current_index(&self) -> Option<u32> {
        match self {
            CollectionState::AwaitingCount => None,
            _ => Some(entry_count(self.entries()) + 1),
        }
    }

    pub fn pending_credit(&self) -> Option<f64> {
        match self {
            CollectionState::AwaitingScore { pending_credit, .. } => Some(*pending_credit),
            _ => None,
        }
    }

    /// Whether a course with this index has already been recorded
    pub fn has_entry(&self, index: u32) -> bool {
        self.entries().iter().any(|e| e.index == index)
    }
}

#[allow(clippy::cast_possible_truncation)] // bounded by the course limit
pub(crate) fn entry_count(entries: &[CourseEntry]) -> u32 {
    entries.len() as u32
}

// ============================================================================
// Session Context
// ============================================================================

/// Range limits applied to user input
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPolicy {
    pub max_courses: u32,
    pub max_credit: f64,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            max_courses: DEFAULT_MAX_COURSES,
            max_credit: DEFAULT_MAX_CREDIT,
        }
    }
}

/// Context for a session (immutable configuration)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub policy: CollectionPolicy,
    pub scale: Arc<GradeScale>,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        policy: CollectionPolicy,
        scale: Arc<GradeScale>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            policy,
            scale,
        }
    }
}
