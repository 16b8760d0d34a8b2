//! GPA collection state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod slots;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use slots::{SlotError, SlotSnapshot, SLOT_KEYS};
pub use state::{CollectionPolicy, CollectionState, CourseEntry, SessionContext};
pub use transition::{transition, TransitionError, TransitionResult};
