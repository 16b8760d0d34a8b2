//! Flat slot representation of the collection state
//!
//! The dialogue framework stores session data as independent named slots.
//! `SlotSnapshot` is that flat view; converting back to a `CollectionState`
//! re-checks every invariant so corrupt slot data never reaches a transition.

use super::state::{entry_count, CollectionState, CourseEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SLOT_EXPECTED_COUNT: &str = "expected_count";
pub const SLOT_CURRENT_INDEX: &str = "current_index";
pub const SLOT_PENDING_CREDIT: &str = "pending_credit";
pub const SLOT_ENTRIES: &str = "entries";

/// Every slot key a session writes, in write order
pub const SLOT_KEYS: [&str; 4] = [
    SLOT_EXPECTED_COUNT,
    SLOT_CURRENT_INDEX,
    SLOT_PENDING_CREDIT,
    SLOT_ENTRIES,
];

#[derive(Debug, Error, PartialEq)]
pub enum SlotError {
    #[error("Slot {key} holds an unreadable value: {message}")]
    Decode { key: &'static str, message: String },
    #[error("Slots hold course data without a course count")]
    MissingCount,
    #[error("Course count must be at least 1")]
    ZeroCount,
    #[error("Entry at position {position} has index {found}")]
    IndexGap { position: u32, found: u32 },
    #[error("Current index {found} does not follow {entries} recorded entries")]
    IndexMismatch { found: u32, entries: u32 },
    #[error("{entries} entries recorded for {expected} expected courses")]
    TooManyEntries { entries: u32, expected: u32 },
    #[error("Pending credit recorded for a completed session")]
    PendingAfterComplete,
}

/// Flat view of a session, one field per slot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub expected_count: Option<u32>,
    pub current_index: Option<u32>,
    pub pending_credit: Option<f64>,
    #[serde(default)]
    pub entries: Vec<CourseEntry>,
}

impl SlotSnapshot {
    /// Slot key/value pairs to write
    pub fn to_pairs(&self) -> Vec<(&'static str, Value)> {
        vec![
            (SLOT_EXPECTED_COUNT, serde_json::json!(self.expected_count)),
            (SLOT_CURRENT_INDEX, serde_json::json!(self.current_index)),
            (SLOT_PENDING_CREDIT, serde_json::json!(self.pending_credit)),
            (
                SLOT_ENTRIES,
                serde_json::to_value(&self.entries).unwrap_or(Value::Array(vec![])),
            ),
        ]
    }

    /// Rebuild from raw slot values; absent or null slots read as empty
    pub fn from_values(
        expected_count: Option<Value>,
        current_index: Option<Value>,
        pending_credit: Option<Value>,
        entries: Option<Value>,
    ) -> Result<Self, SlotError> {
        Ok(Self {
            expected_count: decode(SLOT_EXPECTED_COUNT, expected_count)?,
            current_index: decode(SLOT_CURRENT_INDEX, current_index)?,
            pending_credit: decode(SLOT_PENDING_CREDIT, pending_credit)?,
            entries: decode(SLOT_ENTRIES, entries)?.unwrap_or_default(),
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    key: &'static str,
    value: Option<Value>,
) -> Result<Option<T>, SlotError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| SlotError::Decode {
                key,
                message: e.to_string(),
            }),
    }
}

impl CollectionState {
    pub fn to_slots(&self) -> SlotSnapshot {
        SlotSnapshot {
            expected_count: self.expected_count(),
            current_index: self.current_index(),
            pending_credit: self.pending_credit(),
            entries: self.entries().to_vec(),
        }
    }

    pub fn from_slots(slots: SlotSnapshot) -> Result<Self, SlotError> {
        let SlotSnapshot {
            expected_count,
            current_index,
            pending_credit,
            entries,
        } = slots;

        let Some(expected_count) = expected_count else {
            if entries.is_empty() && pending_credit.is_none() {
                return Ok(CollectionState::AwaitingCount);
            }
            return Err(SlotError::MissingCount);
        };
        if expected_count == 0 {
            return Err(SlotError::ZeroCount);
        }

        for (position, entry) in (1..).zip(entries.iter()) {
            if entry.index != position {
                return Err(SlotError::IndexGap {
                    position,
                    found: entry.index,
                });
            }
        }

        let recorded = entry_count(&entries);
        if let Some(found) = current_index {
            if found != recorded + 1 {
                return Err(SlotError::IndexMismatch {
                    found,
                    entries: recorded,
                });
            }
        }
        if recorded > expected_count {
            return Err(SlotError::TooManyEntries {
                entries: recorded,
                expected: expected_count,
            });
        }

        if recorded == expected_count {
            if pending_credit.is_some() {
                return Err(SlotError::PendingAfterComplete);
            }
            return Ok(CollectionState::Complete {
                expected_count,
                entries,
            });
        }

        Ok(match pending_credit {
            Some(pending_credit) => CollectionState::AwaitingScore {
                expected_count,
                pending_credit,
                entries,
            },
            None => CollectionState::AwaitingCredit {
                expected_count,
                entries,
            },
        })
    }
}
