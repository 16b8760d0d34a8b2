//! Pure state transition function
//!
//! Given the current state, session context and an event, computes the next
//! state and the effects the runtime must carry out. No I/O happens here.

use super::state::entry_count;
use super::{CollectionState, CourseEntry, Effect, Event, SessionContext};
use crate::gpa;
use crate::grading::MAX_SCORE;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: CollectionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: CollectionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition.
///
/// The range errors leave the state untouched and are answered with a
/// re-prompt. `OutOfSequence` means the caller invoked an operation the
/// current state does not allow.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Course count must be a whole number from 1 to {max}, got {value}")]
    InvalidCount { value: f64, max: u32 },
    #[error("Credit must be above 0 and at most {max}, got {value}")]
    InvalidCredit { value: f64, max: f64 },
    #[error("Score must be from 0 to 100, got {value}")]
    InvalidScore { value: f64 },
    #[error("Cannot handle {event} while {state}")]
    OutOfSequence {
        state: &'static str,
        event: &'static str,
    },
}

impl TransitionError {
    /// Whether the caller should simply re-prompt
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TransitionError::OutOfSequence { .. })
    }
}

/// Pure transition function
///
/// Given the same inputs, it always produces the same outputs.
pub fn transition(
    state: &CollectionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Reset is accepted from anywhere
        (_, Event::Reset) => Ok(
            TransitionResult::new(CollectionState::AwaitingCount).with_effect(Effect::ClearSlots),
        ),

        // Redelivered score for a course that is already recorded
        (state, Event::ScoreSupplied { index: Some(index), .. }) if state.has_entry(index) => {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::IgnoredDuplicate { index }))
        }

        // ============================================================
        // Course count
        // ============================================================
        (
            CollectionState::AwaitingCount | CollectionState::Complete { .. },
            Event::CountDeclared { count },
        ) => {
            let expected_count = validate_count(count, context.policy.max_courses)?;
            Ok(TransitionResult::new(CollectionState::AwaitingCredit {
                expected_count,
                entries: vec![],
            })
            .with_effect(Effect::PersistSlots))
        }

        // ============================================================
        // Credit hours
        // ============================================================
        (
            CollectionState::AwaitingCredit {
                expected_count,
                entries,
            },
            Event::CreditSupplied { credit },
        ) => {
            if !(credit.is_finite() && credit > 0.0 && credit <= context.policy.max_credit) {
                return Err(TransitionError::InvalidCredit {
                    value: credit,
                    max: context.policy.max_credit,
                });
            }
            Ok(TransitionResult::new(CollectionState::AwaitingScore {
                expected_count: *expected_count,
                pending_credit: credit,
                entries: entries.clone(),
            })
            .with_effect(Effect::PersistSlots))
        }

        // ============================================================
        // Score
        // ============================================================
        (
            CollectionState::AwaitingScore {
                expected_count,
                pending_credit,
                entries,
            },
            Event::ScoreSupplied { score, index },
        ) => {
            let current = entry_count(entries) + 1;
            if index.is_some_and(|i| i != current) {
                return Err(out_of_sequence(state, "score_supplied"));
            }
            if !(score.is_finite() && (0.0..=MAX_SCORE).contains(&score)) {
                return Err(TransitionError::InvalidScore { value: score });
            }

            let grade = context.scale.score_to_grade(score);
            let mut entries = entries.clone();
            entries.push(CourseEntry::new(current, *pending_credit, score, grade));

            if current < *expected_count {
                return Ok(TransitionResult::new(CollectionState::AwaitingCredit {
                    expected_count: *expected_count,
                    entries,
                })
                .with_effect(Effect::PersistSlots));
            }

            let report = gpa::finalize(&entries);
            Ok(TransitionResult::new(CollectionState::Complete {
                expected_count: *expected_count,
                entries,
            })
            .with_effects([
                Effect::deliver_report(report.clone()),
                Effect::ClearSlots,
                Effect::persist_result(report),
            ]))
        }

        // ============================================================
        // Everything else is a caller contract violation
        // ============================================================
        (state, event) => Err(out_of_sequence(state, event.name())),
    }
}

fn out_of_sequence(state: &CollectionState, event: &'static str) -> TransitionError {
    TransitionError::OutOfSequence {
        state: state.name(),
        event,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range checked first
fn validate_count(count: f64, max: u32) -> Result<u32, TransitionError> {
    let whole = count.is_finite() && count.fract().abs() < f64::EPSILON;
    if whole && count >= 1.0 && count <= f64::from(max) {
        Ok(count as u32)
    } else {
        Err(TransitionError::InvalidCount { value: count, max })
    }
}
