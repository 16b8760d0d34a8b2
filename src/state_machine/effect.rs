//! Effects produced by state transitions

use crate::gpa::Report;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write the new state to the slot store
    PersistSlots,

    /// Remove every slot of the session
    ClearSlots,

    /// Hand the finished report back to the caller
    DeliverReport { report: Report },

    /// Best-effort write of the finished report to the result sink
    PersistResult { report: Report },

    /// A score for an already recorded course was dropped
    IgnoredDuplicate { index: u32 },
}

impl Effect {
    pub fn deliver_report(report: Report) -> Self {
        Effect::DeliverReport { report }
    }

    pub fn persist_result(report: Report) -> Self {
        Effect::PersistResult { report }
    }
}
