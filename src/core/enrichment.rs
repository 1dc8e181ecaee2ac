use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::model::{AudioHandle, CapturePhase, CaptureState, Coordinates, Enrichments};
use super::providers::{AudioCaptureProvider, CaptureError, LocationProvider};

/// Settled result of an asynchronous capture, routed back into the
/// controller loop by the task that ran the provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Location(Result<Coordinates, CaptureError>),
    Audio(Result<AudioHandle, CaptureError>),
}

/// Manages the enrichment captures of the live session.
///
/// Each kind is independent: one failing or stalling never blocks another,
/// and completion order is unconstrained. Only the controller loop calls
/// into the coordinator, so no synchronization is needed here.
pub struct EnrichmentCoordinator {
    location_provider: Arc<dyn LocationProvider>,
    audio_provider: Arc<dyn AudioCaptureProvider>,
    enrichments: Enrichments,
}

impl EnrichmentCoordinator {
    pub fn new(
        location_provider: Arc<dyn LocationProvider>,
        audio_provider: Arc<dyn AudioCaptureProvider>,
    ) -> Self {
        Self {
            location_provider,
            audio_provider,
            enrichments: Enrichments::default(),
        }
    }

    pub fn enrichments(&self) -> &Enrichments {
        &self.enrichments
    }

    /// Start a location capture, or coalesce onto the one in flight.
    ///
    /// The provider call runs on its own task and reports back through
    /// `events`, wrapped by `wrap` (which is where the caller stamps the
    /// session id). Returns the capture phase after the request.
    pub fn request_location<E, F>(&mut self, events: &mpsc::Sender<E>, wrap: F) -> CapturePhase
    where
        E: Send + 'static,
        F: FnOnce(Result<Coordinates, CaptureError>) -> E + Send + 'static,
    {
        if self.enrichments.location.is_in_progress() {
            debug!("location capture already in flight, coalescing");
            return CapturePhase::InProgress;
        }
        self.enrichments.location = CaptureState::InProgress;
        info!("location capture started");

        let provider = Arc::clone(&self.location_provider);
        let tx = events.clone();
        tokio::spawn(async move {
            let result = provider.acquire().await;
            let _ = tx.send(wrap(result)).await;
        });
        CapturePhase::InProgress
    }

    /// Start an audio capture of at most `duration`, or coalesce onto the
    /// one in flight. The provider settles at or before `duration`; no
    /// extra timeout is layered on top.
    pub fn request_audio<E, F>(
        &mut self,
        duration: Duration,
        events: &mpsc::Sender<E>,
        wrap: F,
    ) -> CapturePhase
    where
        E: Send + 'static,
        F: FnOnce(Result<AudioHandle, CaptureError>) -> E + Send + 'static,
    {
        if self.enrichments.audio.is_in_progress() {
            debug!("audio capture already in flight, coalescing");
            return CapturePhase::InProgress;
        }
        self.enrichments.audio = CaptureState::InProgress;
        info!("audio capture started ({}s)", duration.as_secs());

        let provider = Arc::clone(&self.audio_provider);
        let tx = events.clone();
        tokio::spawn(async move {
            let result = provider.record(duration).await;
            let _ = tx.send(wrap(result)).await;
        });
        CapturePhase::InProgress
    }

    /// Select or type the message attached to the alert. Synchronous and
    /// always succeeds; an empty string clears the text.
    pub fn set_message(&mut self, text: String) {
        info!("alert message set ({} chars)", text.len());
        self.enrichments.message = CaptureState::Succeeded(text);
    }

    /// Apply a provider outcome to the matching capture record. Outcomes
    /// for a capture that is not in flight are ignored.
    pub fn settle(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Location(result) => {
                if !self.enrichments.location.is_in_progress() {
                    debug!("ignoring location result with no capture in flight");
                    return;
                }
                self.enrichments.location = match result {
                    Ok(coords) => {
                        info!("location captured: {}", coords.display());
                        CaptureState::Succeeded(coords)
                    }
                    Err(err) => {
                        warn!("location capture failed: {}", err);
                        CaptureState::Failed(err)
                    }
                };
            }
            CaptureOutcome::Audio(result) => {
                if !self.enrichments.audio.is_in_progress() {
                    debug!("ignoring audio result with no capture in flight");
                    return;
                }
                self.enrichments.audio = match result {
                    Ok(handle) => {
                        info!("audio snippet captured");
                        CaptureState::Succeeded(handle)
                    }
                    Err(err) => {
                        warn!("audio capture failed: {}", err);
                        CaptureState::Failed(err)
                    }
                };
            }
        }
    }

    /// Forget all capture records. Results still in flight will be ignored
    /// when they settle.
    pub fn reset(&mut self) {
        self.enrichments = Enrichments::default();
    }
}
