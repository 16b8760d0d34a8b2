//! Session runtime executor

use super::traits::{ResultSink, SessionMetadata, SlotStore};

use crate::gpa::Report;
use crate::input::{parse_value, InputError, InputField};
use crate::prompts::{format_message, next_prompt, persistence_advisory, rejection_message};
use crate::state_machine::slots::{
    SLOT_CURRENT_INDEX, SLOT_ENTRIES, SLOT_EXPECTED_COUNT, SLOT_PENDING_CREDIT,
};
use crate::state_machine::{
    transition, CollectionState, Effect, Event, SessionContext, SlotSnapshot, TransitionError,
    TransitionResult,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Operation requested by the dialogue layer
#[derive(Debug, Clone)]
pub enum Command {
    /// Declare how many courses will follow
    Start { raw: Value },
    SupplyCredit { raw: Value },
    /// Score for the current course; `index` binds it to a specific course
    SupplyScore { raw: Value, index: Option<u32> },
    Reset,
    /// Read the current state without changing it
    Inspect,
}

impl Command {
    fn field(&self) -> Option<InputField> {
        match self {
            Command::Start { .. } => Some(InputField::Count),
            Command::SupplyCredit { .. } => Some(InputField::Credit),
            Command::SupplyScore { .. } => Some(InputField::Score),
            Command::Reset | Command::Inspect => None,
        }
    }

    fn into_event(self) -> Result<Option<Event>, InputError> {
        Ok(Some(match self {
            Command::Start { raw } => Event::CountDeclared {
                count: parse_value(&raw)?,
            },
            Command::SupplyCredit { raw } => Event::CreditSupplied {
                credit: parse_value(&raw)?,
            },
            Command::SupplyScore { raw, index } => Event::ScoreSupplied {
                score: parse_value(&raw)?,
                index,
            },
            Command::Reset => Event::Reset,
            Command::Inspect => return Ok(None),
        }))
    }
}

/// Request envelope delivered to a session actor
#[derive(Debug)]
pub struct SessionRequest {
    pub command: Command,
    pub reply_tx: oneshot::Sender<Result<StepReply, StepError>>,
}

/// Error classification shared with API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidFormat,
    InvalidCount,
    InvalidCredit,
    InvalidScore,
    OutOfSequence,
    PersistenceFailure,
    Storage,
    Unavailable,
}

impl From<&TransitionError> for ErrorKind {
    fn from(error: &TransitionError) -> Self {
        match error {
            TransitionError::InvalidCount { .. } => ErrorKind::InvalidCount,
            TransitionError::InvalidCredit { .. } => ErrorKind::InvalidCredit,
            TransitionError::InvalidScore { .. } => ErrorKind::InvalidScore,
            TransitionError::OutOfSequence { .. } => ErrorKind::OutOfSequence,
        }
    }
}

/// A classified message attached to a reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyNote {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one accepted or locally recovered operation
#[derive(Debug, Clone, Serialize)]
pub struct StepReply {
    pub accepted: bool,
    /// What to ask the user next
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<ReplyNote>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    pub state: CollectionState,
}

impl StepReply {
    fn accepted(state: CollectionState) -> Self {
        Self {
            accepted: true,
            prompt: next_prompt(&state),
            report: None,
            report_text: None,
            error: None,
            advisory: None,
            duplicate: false,
            state,
        }
    }

    fn rejected(state: CollectionState, kind: ErrorKind, message: String) -> Self {
        Self {
            accepted: false,
            error: Some(ReplyNote { kind, message }),
            ..Self::accepted(state)
        }
    }
}

/// Failures that cross the session boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    #[error("Cannot handle {event} while {state}")]
    OutOfSequence {
        state: &'static str,
        event: &'static str,
    },
    #[error("Slot storage failed: {0}")]
    Storage(String),
    #[error("Session runtime unavailable: {0}")]
    Unavailable(String),
}

impl StepError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::OutOfSequence { .. } => ErrorKind::OutOfSequence,
            StepError::Storage(_) => ErrorKind::Storage,
            StepError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

/// Generic session runtime that works with any slot store and result sink
pub struct SessionRuntime<S, R>
where
    S: SlotStore + 'static,
    R: ResultSink + 'static,
{
    context: SessionContext,
    slots: S,
    results: Option<R>,
}

impl<S, R> SessionRuntime<S, R>
where
    S: SlotStore + 'static,
    R: ResultSink + 'static,
{
    pub fn new(context: SessionContext, slots: S) -> Self {
        Self {
            context,
            slots,
            results: None,
        }
    }

    /// Record finished reports through this sink
    pub fn with_result_sink(mut self, sink: R) -> Self {
        self.results = Some(sink);
        self
    }

    /// Serve requests until the channel closes or the session goes idle
    pub async fn run(self, mut request_rx: mpsc::Receiver<SessionRequest>, idle_timeout: Duration) {
        let session_id = self.context.session_id.clone();
        tracing::debug!(session_id = %session_id, "Starting session runtime");

        loop {
            match tokio::time::timeout(idle_timeout, request_rx.recv()).await {
                Ok(Some(request)) => self.serve(request).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new work, then finish whatever was already queued
                    request_rx.close();
                    while let Ok(request) = request_rx.try_recv() {
                        self.serve(request).await;
                    }
                    tracing::debug!(session_id = %session_id, "Session idle, stopping runtime");
                    break;
                }
            }
        }

        tracing::debug!(session_id = %session_id, "Session runtime stopped");
    }

    async fn serve(&self, request: SessionRequest) {
        let SessionRequest { command, reply_tx } = request;
        let result = self.process(command).await;
        if let Err(StepError::Storage(e)) = &result {
            tracing::error!(
                session_id = %self.context.session_id,
                error = %e,
                "Slot storage failed"
            );
        }
        let _ = reply_tx.send(result);
    }

    /// Handle one command against the stored session state
    pub async fn process(&self, command: Command) -> Result<StepReply, StepError> {
        let session_id = &self.context.session_id;
        let state = self.load_state().await?;
        let field = command.field();

        let event = match command.into_event() {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(StepReply::accepted(state)),
            Err(error) => {
                let Some(field) = field else {
                    return Ok(StepReply::accepted(state));
                };
                if !expects(&state, field) {
                    return Err(self.out_of_sequence(&state, field));
                }
                tracing::info!(
                    session_id = %session_id,
                    %field,
                    error = %error,
                    "Unreadable input"
                );
                let message = format_message(field, &error);
                return Ok(StepReply::rejected(state, ErrorKind::InvalidFormat, message));
            }
        };

        let event_name = event.name();
        match transition(&state, &self.context, event) {
            Ok(result) => {
                tracing::debug!(
                    session_id = %session_id,
                    event = event_name,
                    from = state.name(),
                    to = result.new_state.name(),
                    "Transition accepted"
                );
                self.apply(result).await
            }
            Err(TransitionError::OutOfSequence { state, event }) => {
                tracing::warn!(session_id = %session_id, state, event, "Out-of-sequence call");
                Err(StepError::OutOfSequence { state, event })
            }
            Err(error) => {
                let kind = ErrorKind::from(&error);
                tracing::info!(session_id = %session_id, ?kind, error = %error, "Input rejected");
                Ok(StepReply::rejected(state, kind, rejection_message(&error)))
            }
        }
    }

    fn out_of_sequence(&self, state: &CollectionState, field: InputField) -> StepError {
        let event = match field {
            InputField::Count => "count_declared",
            InputField::Credit => "credit_supplied",
            InputField::Score => "score_supplied",
        };
        tracing::warn!(
            session_id = %self.context.session_id,
            state = state.name(),
            event,
            "Out-of-sequence call"
        );
        StepError::OutOfSequence {
            state: state.name(),
            event,
        }
    }

    async fn load_state(&self) -> Result<CollectionState, StepError> {
        let session_id = &self.context.session_id;
        let snapshot = SlotSnapshot::from_values(
            self.read_slot(SLOT_EXPECTED_COUNT).await?,
            self.read_slot(SLOT_CURRENT_INDEX).await?,
            self.read_slot(SLOT_PENDING_CREDIT).await?,
            self.read_slot(SLOT_ENTRIES).await?,
        );

        match snapshot.and_then(CollectionState::from_slots) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Corrupt session slots, starting over"
                );
                self.slots
                    .clear_slots(session_id)
                    .await
                    .map_err(StepError::Storage)?;
                Ok(CollectionState::AwaitingCount)
            }
        }
    }

    async fn read_slot(&self, key: &str) -> Result<Option<Value>, StepError> {
        self.slots
            .get_slot(&self.context.session_id, key)
            .await
            .map_err(StepError::Storage)
    }

    async fn apply(&self, result: TransitionResult) -> Result<StepReply, StepError> {
        let TransitionResult { new_state, effects } = result;
        let mut reply = StepReply::accepted(new_state);
        for effect in effects {
            self.execute_effect(effect, &mut reply).await?;
        }
        Ok(reply)
    }

    async fn execute_effect(&self, effect: Effect, reply: &mut StepReply) -> Result<(), StepError> {
        let session_id = &self.context.session_id;
        match effect {
            Effect::PersistSlots => {
                let pairs = reply.state.to_slots().to_pairs();
                self.slots
                    .set_slots(session_id, &pairs)
                    .await
                    .map_err(StepError::Storage)?;
            }

            Effect::ClearSlots => {
                self.slots
                    .clear_slots(session_id)
                    .await
                    .map_err(StepError::Storage)?;
            }

            Effect::DeliverReport { report } => {
                tracing::info!(
                    session_id = %session_id,
                    courses = report.entries.len(),
                    total_credits = report.total_credits,
                    gpa = report.gpa,
                    "GPA computed"
                );
                reply.report_text = Some(report.render());
                reply.report = Some(report);
            }

            Effect::PersistResult { report } => {
                let Some(sink) = &self.results else {
                    tracing::debug!(session_id = %session_id, "Result persistence disabled");
                    return Ok(());
                };
                let metadata = SessionMetadata {
                    sender_id: session_id.clone(),
                    scale: self.context.scale.name().to_string(),
                    completed_at: chrono::Utc::now(),
                };
                if let Err(e) = sink.persist(&report, &metadata).await {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to persist GPA result"
                    );
                    reply.advisory = Some(ReplyNote {
                        kind: ErrorKind::PersistenceFailure,
                        message: persistence_advisory(&e),
                    });
                }
            }

            Effect::IgnoredDuplicate { index } => {
                tracing::debug!(session_id = %session_id, index, "Duplicate score ignored");
                reply.duplicate = true;
            }
        }
        Ok(())
    }
}

/// Whether the state is waiting for this kind of input
fn expects(state: &CollectionState, field: InputField) -> bool {
    matches!(
        (state, field),
        (
            CollectionState::AwaitingCount | CollectionState::Complete { .. },
            InputField::Count
        ) | (CollectionState::AwaitingCredit { .. }, InputField::Credit)
            | (CollectionState::AwaitingScore { .. }, InputField::Score)
    )
}
