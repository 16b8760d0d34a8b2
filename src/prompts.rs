//! User-facing prompt text
//!
//! Every prompt is a pure function of the collection state.

use crate::input::{InputError, InputField};
use crate::state_machine::{CollectionState, TransitionError};

/// The question to ask next
pub fn next_prompt(state: &CollectionState) -> String {
    match state {
        CollectionState::AwaitingCount => {
            "How many courses would you like to include? (e.g. 4)".to_string()
        }
        CollectionState::AwaitingCredit { .. } => {
            format!("Course {}: how many credits? (e.g. 3)", index_of(state))
        }
        CollectionState::AwaitingScore { .. } => {
            format!("Course {}: what was your score? (0-100)", index_of(state))
        }
        CollectionState::Complete { .. } => {
            "All courses recorded. Send a new course count to start again.".to_string()
        }
    }
}

fn index_of(state: &CollectionState) -> u32 {
    state.current_index().unwrap_or(1)
}

/// Explanation shown when a value is out of range
pub fn rejection_message(error: &TransitionError) -> String {
    match error {
        TransitionError::InvalidCount { max, .. } => {
            format!("The number of courses must be a whole number from 1 to {max}.")
        }
        TransitionError::InvalidCredit { max, .. } => {
            format!(
                "Credits must be greater than 0 and at most {}.",
                crate::gpa::format_number(*max)
            )
        }
        TransitionError::InvalidScore { .. } => {
            "The score must be between 0 and 100.".to_string()
        }
        TransitionError::OutOfSequence { .. } => error.to_string(),
    }
}

/// Explanation shown when no number could be read
pub fn format_message(field: InputField, error: &InputError) -> String {
    let example = match field {
        InputField::Count => "2",
        InputField::Credit => "3",
        InputField::Score => "95",
    };
    match error {
        InputError::UnsupportedType(kind) => {
            format!("A {kind} is not a valid {field}. Please send a number, e.g. {example}.")
        }
        InputError::Empty | InputError::NoNumber(_) => {
            format!("Please enter the {field} as a number, e.g. {example}.")
        }
    }
}

/// Note attached to a report whose result could not be saved
pub fn persistence_advisory(detail: &str) -> String {
    format!("Your result could not be saved ({detail}); the calculation above is still correct.")
}
