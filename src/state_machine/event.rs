//! Events that can occur in a GPA session

/// Events that trigger state transitions.
///
/// Values are already parsed to numbers; range checks happen in the
/// transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// User declared how many courses they will enter
    CountDeclared { count: f64 },

    /// Credit hours for the current course
    CreditSupplied { credit: f64 },

    /// Score for the current course.
    ///
    /// `index` is the course the caller prompted for, when it knows it. A
    /// redelivered score for an already recorded index is ignored.
    ScoreSupplied { score: f64, index: Option<u32> },

    /// Abandon the session
    Reset,
}

impl Event {
    /// Short name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Event::CountDeclared { .. } => "count_declared",
            Event::CreditSupplied { .. } => "credit_supplied",
            Event::ScoreSupplied { .. } => "score_supplied",
            Event::Reset => "reset",
        }
    }
}
