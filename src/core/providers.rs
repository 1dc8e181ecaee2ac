// Capability contracts consumed by the alert core.
//
// Providers are injected by the host and may succeed, fail, or take their
// time. Their internals (geolocation stack, microphone, transport) are the
// host's concern; the core only records how each attempt settled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{AlertPayload, AudioHandle, Coordinates};

/// Failure of a single capture attempt. Terminal for that attempt, but a
/// fresh request may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CaptureError {
    #[error("permission denied by the device or user")]
    PermissionDenied,
    #[error("capability unavailable")]
    Unavailable,
    #[error("capture timed out")]
    Timeout,
}

/// Failure of the dispatch call. The session stays dispatched either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DispatchError {
    #[error("network failure")]
    Network,
    #[error("rejected by the receiving service")]
    Rejected,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn acquire(&self) -> Result<Coordinates, CaptureError>;
}

#[async_trait]
pub trait AudioCaptureProvider: Send + Sync {
    /// Record a snippet of at most `duration`. The provider settles at or
    /// before `duration` elapses; enforcing that bound is its job, not the
    /// caller's.
    async fn record(&self, duration: Duration) -> Result<AudioHandle, CaptureError>;
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send(&self, payload: AlertPayload) -> Result<(), DispatchError>;
}
