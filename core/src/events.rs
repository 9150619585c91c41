//! The event/diagnostics surface (C12, §4.12): a stable, additive set of
//! observable call events, delivered through an [`EventSink`].
//!
//! Listeners key off [`Event`]'s discriminant, not its `Debug` output, so
//! new variants may be added freely; existing ones never change shape.

use crate::error::Code;

/// A single observable occurrence in a call's lifecycle. IDs are fixed and
/// match the teacher's numbering (§4.12): 1-7 describe either side of a
/// call, 8-9 are client-only and needed to make the retry engine's behavior
/// assertable in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `1` — a call began.
    CallStart { full_name: String },
    /// `2` — a call ended (success or failure).
    CallStop,
    /// `3` — a call ended with a non-OK status.
    CallFailed { status_code: Code },
    /// `4` — a call's deadline elapsed before it completed.
    CallDeadlineExceeded,
    /// `5` — one message was sent.
    MessageSent,
    /// `6` — one message was received.
    MessageReceived,
    /// `7` — a call targeted a method with no registered handler.
    CallUnimplemented { full_name: String },
    /// `8` — the retry engine committed to one attempt's outcome.
    CallCommitted { reason: CommitReason },
    /// `9` — the retry engine spawned a new attempt (retry or hedge).
    AttemptSpawned { attempt_number: u32 },
}

impl Event {
    /// The stable numeric ID for this event's variant.
    pub fn id(&self) -> u32 {
        match self {
            Event::CallStart { .. } => 1,
            Event::CallStop => 2,
            Event::CallFailed { .. } => 3,
            Event::CallDeadlineExceeded => 4,
            Event::MessageSent => 5,
            Event::MessageReceived => 6,
            Event::CallUnimplemented { .. } => 7,
            Event::CallCommitted { .. } => 8,
            Event::AttemptSpawned { .. } => 9,
        }
    }
}

/// Why the retry/hedging engine committed to a particular attempt (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitReason {
    ResponseHeadersReceived,
    FatalStatusCode,
    Canceled,
    ExceededAttemptCount,
    Throttled,
    DeadlineExceeded,
}

/// Receives [`Event`]s as they occur. Implementations must not block or
/// perform I/O that could stall the call issuing the event.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: Event);
}

/// Default sink: forwards every event to `tracing` at `debug` (or `warn` for
/// failure-shaped events), with the event's stable ID and fields as
/// structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::CallStart { full_name } => {
                tracing::debug!(event_id = event.id(), full_name, "call started");
            }
            Event::CallStop => {
                tracing::debug!(event_id = event.id(), "call stopped");
            }
            Event::CallFailed { status_code } => {
                tracing::warn!(
                    event_id = event.id(),
                    status_code = status_code.as_str(),
                    "call failed"
                );
            }
            Event::CallDeadlineExceeded => {
                tracing::warn!(event_id = event.id(), "call deadline exceeded");
            }
            Event::MessageSent => {
                tracing::debug!(event_id = event.id(), "message sent");
            }
            Event::MessageReceived => {
                tracing::debug!(event_id = event.id(), "message received");
            }
            Event::CallUnimplemented { full_name } => {
                tracing::warn!(event_id = event.id(), full_name, "call unimplemented");
            }
            Event::CallCommitted { reason } => {
                tracing::debug!(event_id = event.id(), reason = ?reason, "call committed");
            }
            Event::AttemptSpawned { attempt_number } => {
                tracing::debug!(event_id = event.id(), attempt_number, "attempt spawned");
            }
        }
    }
}

/// Test-only sink that collects every emitted event in order, for assertions
/// against the end-to-end scenarios in §8.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .expect("event sink mutex poisoned")
            .push(event);
    }
}
