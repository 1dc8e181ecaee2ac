// Session and capture types for the emergency alert core.
//
// NOTE: the host UI consumes these as JSON via the snapshot channel.
// Keep serde representations stable when modifying data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::providers::{CaptureError, DispatchError};

/// Identifier for one run of the escalation sequence.
///
/// Allocated fresh at every `open()`. Async completions carry the id they
/// were issued against and are dropped when it no longer matches the live
/// session.
pub type SessionId = u64;

/// Lifecycle state of the alert session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlertState {
    #[default]
    Idle,
    Armed,
    Dispatched,
    Cancelled,
}

/// The optional captures that can be attached to a dispatched alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnrichmentKind {
    Location,
    Audio,
    Message,
}

impl EnrichmentKind {
    /// Get the display name for this enrichment
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Location => "Live Location",
            Self::Audio => "Audio Snippet",
            Self::Message => "Message",
        }
    }

    /// Get all enrichment kinds
    pub fn all() -> &'static [EnrichmentKind] {
        &[Self::Location, Self::Audio, Self::Message]
    }
}

/// Geographic fix returned by the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Human-readable "lat, lon" at five decimal places, the precision
    /// shown to emergency contacts.
    pub fn display(&self) -> String {
        format!("{:.5}, {:.5}", self.lat, self.lon)
    }
}

/// Opaque reference to a recorded audio snippet. Stored on the session,
/// never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioHandle(pub String);

/// Per-capture record. The result is present iff the capture succeeded,
/// the error iff it failed. A settled capture re-enters `InProgress` only
/// through an explicit re-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaptureState<T> {
    NotStarted,
    InProgress,
    Succeeded(T),
    Failed(CaptureError),
}

// Manual impl: the derive would demand `T: Default` even though the
// default variant carries no value.
impl<T> Default for CaptureState<T> {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl<T> CaptureState<T> {
    pub fn phase(&self) -> CapturePhase {
        match self {
            Self::NotStarted => CapturePhase::NotStarted,
            Self::InProgress => CapturePhase::InProgress,
            Self::Succeeded(_) => CapturePhase::Succeeded,
            Self::Failed(_) => CapturePhase::Failed,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Succeeded(value) => Some(value),
            _ => None,
        }
    }
}

/// Untyped view of a capture record, for uniform status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturePhase {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

/// Capture records for the live session, one per enrichment kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Enrichments {
    pub location: CaptureState<Coordinates>,
    pub audio: CaptureState<AudioHandle>,
    pub message: CaptureState<String>,
}

impl Enrichments {
    pub fn phase(&self, kind: EnrichmentKind) -> CapturePhase {
        match kind {
            EnrichmentKind::Location => self.location.phase(),
            EnrichmentKind::Audio => self.audio.phase(),
            EnrichmentKind::Message => self.message.phase(),
        }
    }
}

/// Outcome of the one-time dispatch call. A failure is observable here but
/// never rolls the session back out of `Dispatched`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DispatchState {
    #[default]
    NotSent,
    Pending,
    Sent,
    Failed(DispatchError),
}

/// Payload handed to the dispatcher, snapshotted at the moment of dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub location: Option<Coordinates>,
    pub audio: Option<AudioHandle>,
    pub message: Option<String>,
}

/// Published to subscribers on every observable change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    pub session_id: Option<SessionId>,
    pub state: AlertState,
    pub remaining_ticks: u32,
    pub enrichments: Enrichments,
    pub dispatch: DispatchState,
}
