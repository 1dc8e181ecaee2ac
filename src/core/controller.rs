// Alert controller state machine.
//
// Single-loop actor: one spawned task owns all session state and processes
// commands and async completions one event at a time. Every completion is
// stamped with the session id it was issued against; events for a session
// that is no longer live are dropped, so late provider results can never
// contaminate a newer session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use super::config::Settings;
use super::countdown::{self, CountdownEvent, CountdownHandle};
use super::enrichment::{CaptureOutcome, EnrichmentCoordinator};
use super::guard;
use super::model::{
    AlertPayload, AlertState, CapturePhase, DispatchState, SessionId, SessionSnapshot,
};
use super::providers::{AlertDispatcher, AudioCaptureProvider, DispatchError, LocationProvider};

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 32;

/// Input errors, reported synchronously. None of them change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("a session is already active")]
    SessionActive,
    #[error("no session is active")]
    NoSession,
    #[error("enrichment requires a dispatched alert")]
    NotDispatched,
    #[error("cannot close an armed alert, cancel it first")]
    AlarmArmed,
    #[error("controller is shut down")]
    Closed,
}

type Reply<T> = oneshot::Sender<Result<T, ControllerError>>;

enum Command {
    Open { reply: Reply<SessionId> },
    Cancel { reply: Reply<()> },
    SubmitSafeWord { input: String, reply: Reply<bool> },
    RequestLocation { reply: Reply<CapturePhase> },
    RequestAudio { duration: Duration, reply: Reply<CapturePhase> },
    SetMessage { text: String, reply: Reply<()> },
    Close { reply: Reply<()> },
}

enum Event {
    Countdown { session: SessionId, event: CountdownEvent },
    Capture { session: SessionId, outcome: CaptureOutcome },
    Dispatch { session: SessionId, result: Result<(), DispatchError> },
}

/// Handle to the alert controller. Cheap to clone; all clones talk to the
/// same session.
#[derive(Clone)]
pub struct AlertController {
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
}

impl AlertController {
    /// Spawn the controller loop on the current tokio runtime.
    pub fn spawn(
        settings: Settings,
        location: Arc<dyn LocationProvider>,
        audio: Arc<dyn AudioCaptureProvider>,
        dispatcher: Arc<dyn AlertDispatcher>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let controller_loop = ControllerLoop {
            settings,
            dispatcher,
            coordinator: EnrichmentCoordinator::new(location, audio),
            event_tx,
            snapshot_tx,
            next_session_id: 0,
            session: None,
        };
        tokio::spawn(controller_loop.run(cmd_rx, event_rx));

        Self { cmd_tx, snapshot_rx }
    }

    /// Subscribe to session snapshots, delivered on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current snapshot without subscribing.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Arm a new alert session and start its countdown.
    pub async fn open(&self) -> Result<SessionId, ControllerError> {
        self.request(|reply| Command::Open { reply }).await
    }

    /// Cancel an armed alert before it dispatches. A no-op once the session
    /// is already cancelled or dispatched.
    pub async fn cancel(&self) -> Result<(), ControllerError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    /// Try the safe word. `Ok(true)` means the alert was disarmed exactly
    /// as `cancel()` would; `Ok(false)` means nothing changed.
    pub async fn submit_safe_word(
        &self,
        input: impl Into<String>,
    ) -> Result<bool, ControllerError> {
        let input = input.into();
        self.request(|reply| Command::SubmitSafeWord { input, reply }).await
    }

    /// Start (or coalesce onto) a location capture for a dispatched alert.
    pub async fn request_location(&self) -> Result<CapturePhase, ControllerError> {
        self.request(|reply| Command::RequestLocation { reply }).await
    }

    /// Start (or coalesce onto) an audio capture for a dispatched alert.
    pub async fn request_audio(
        &self,
        duration: Duration,
    ) -> Result<CapturePhase, ControllerError> {
        self.request(|reply| Command::RequestAudio { duration, reply }).await
    }

    /// Attach or replace the message on a dispatched alert. Empty clears it.
    pub async fn set_message(&self, text: impl Into<String>) -> Result<(), ControllerError> {
        let text = text.into();
        self.request(|reply| Command::SetMessage { text, reply }).await
    }

    /// Tear down a cancelled or dispatched session. Outstanding capture
    /// results are ignored when they settle, not awaited.
    pub async fn close(&self) -> Result<(), ControllerError> {
        self.request(|reply| Command::Close { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ControllerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| ControllerError::Closed)?;
        reply_rx.await.map_err(|_| ControllerError::Closed)?
    }
}

/// The live session, present only between `open()` and `close()`.
struct Session {
    id: SessionId,
    state: AlertState,
    remaining_ticks: u32,
    countdown: Option<CountdownHandle>,
    dispatch: DispatchState,
}

struct ControllerLoop {
    settings: Settings,
    dispatcher: Arc<dyn AlertDispatcher>,
    coordinator: EnrichmentCoordinator,
    event_tx: mpsc::Sender<Event>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    next_session_id: SessionId,
    session: Option<Session>,
}

impl ControllerLoop {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut event_rx: mpsc::Receiver<Event>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    // Every handle dropped: shut down
                    None => break,
                },
                Some(event) = event_rx.recv() => self.handle_event(event),
            }
        }
        if let Some(session) = &self.session {
            if let Some(handle) = &session.countdown {
                handle.cancel();
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open { reply } => {
                let _ = reply.send(self.handle_open());
            }
            Command::Cancel { reply } => {
                let _ = reply.send(self.handle_cancel());
            }
            Command::SubmitSafeWord { input, reply } => {
                let _ = reply.send(self.handle_safe_word(&input));
            }
            Command::RequestLocation { reply } => {
                let _ = reply.send(self.handle_request_location());
            }
            Command::RequestAudio { duration, reply } => {
                let _ = reply.send(self.handle_request_audio(duration));
            }
            Command::SetMessage { text, reply } => {
                let _ = reply.send(self.handle_set_message(text));
            }
            Command::Close { reply } => {
                let _ = reply.send(self.handle_close());
            }
        }
        self.publish();
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Countdown { session, event } => self.on_countdown(session, event),
            Event::Capture { session, outcome } => self.on_capture(session, outcome),
            Event::Dispatch { session, result } => self.on_dispatch(session, result),
        }
        self.publish();
    }

    fn handle_open(&mut self) -> Result<SessionId, ControllerError> {
        if self.session.is_some() {
            return Err(ControllerError::SessionActive);
        }

        self.next_session_id += 1;
        let id = self.next_session_id;
        let ticks = self.settings.countdown_ticks;

        let countdown = countdown::start(ticks, self.event_tx.clone(), move |event| {
            Event::Countdown { session: id, event }
        });
        self.session = Some(Session {
            id,
            state: AlertState::Armed,
            remaining_ticks: ticks,
            countdown: Some(countdown),
            dispatch: DispatchState::NotSent,
        });
        info!("session {} armed, dispatch in {} ticks", id, ticks);
        Ok(id)
    }

    fn handle_cancel(&mut self) -> Result<(), ControllerError> {
        let session = self.session.as_mut().ok_or(ControllerError::NoSession)?;
        match session.state {
            AlertState::Armed => {
                if let Some(handle) = session.countdown.take() {
                    handle.cancel();
                }
                session.state = AlertState::Cancelled;
                info!("session {} cancelled", session.id);
                Ok(())
            }
            // There is no un-send and no double-cancel
            AlertState::Dispatched | AlertState::Cancelled => Ok(()),
            AlertState::Idle => Err(ControllerError::NoSession),
        }
    }

    fn handle_safe_word(&mut self, input: &str) -> Result<bool, ControllerError> {
        let session = self.session.as_ref().ok_or(ControllerError::NoSession)?;
        if session.state != AlertState::Armed {
            return Ok(false);
        }
        if !guard::check(input, &self.settings.safe_word) {
            debug!("session {} incorrect safe word", session.id);
            return Ok(false);
        }
        self.handle_cancel()?;
        Ok(true)
    }

    fn handle_request_location(&mut self) -> Result<CapturePhase, ControllerError> {
        let session = self.session.as_ref().ok_or(ControllerError::NoSession)?;
        if session.state != AlertState::Dispatched {
            return Err(ControllerError::NotDispatched);
        }
        let id = session.id;
        let phase = self
            .coordinator
            .request_location(&self.event_tx, move |result| Event::Capture {
                session: id,
                outcome: CaptureOutcome::Location(result),
            });
        Ok(phase)
    }

    fn handle_request_audio(&mut self, duration: Duration) -> Result<CapturePhase, ControllerError> {
        let session = self.session.as_ref().ok_or(ControllerError::NoSession)?;
        if session.state != AlertState::Dispatched {
            return Err(ControllerError::NotDispatched);
        }
        let id = session.id;
        let phase =
            self.coordinator
                .request_audio(duration, &self.event_tx, move |result| Event::Capture {
                    session: id,
                    outcome: CaptureOutcome::Audio(result),
                });
        Ok(phase)
    }

    fn handle_set_message(&mut self, text: String) -> Result<(), ControllerError> {
        let session = self.session.as_ref().ok_or(ControllerError::NoSession)?;
        if session.state != AlertState::Dispatched {
            return Err(ControllerError::NotDispatched);
        }
        self.coordinator.set_message(text);
        Ok(())
    }

    fn handle_close(&mut self) -> Result<(), ControllerError> {
        match &self.session {
            // Closing an idle controller is harmless
            None => Ok(()),
            Some(session) if session.state == AlertState::Armed => {
                Err(ControllerError::AlarmArmed)
            }
            Some(session) => {
                info!("session {} closed", session.id);
                self.session = None;
                self.coordinator.reset();
                Ok(())
            }
        }
    }

    fn on_countdown(&mut self, id: SessionId, event: CountdownEvent) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!("dropping countdown event for stale session {}", id);
            return;
        };
        if session.state != AlertState::Armed {
            // Cancelled between the tick being emitted and being processed
            return;
        }
        match event {
            CountdownEvent::Tick { remaining } => {
                session.remaining_ticks = remaining;
            }
            CountdownEvent::Elapsed => self.dispatch(),
        }
    }

    /// The one edge into `Dispatched`: reachable only from an armed session
    /// whose countdown elapsed. State flips before the send is spawned, so
    /// the dispatch result can never roll it back.
    fn dispatch(&mut self) {
        let Some(session) = self.session.as_mut() else { return };
        session.state = AlertState::Dispatched;
        session.remaining_ticks = 0;
        session.dispatch = DispatchState::Pending;
        session.countdown = None;

        let enrichments = self.coordinator.enrichments();
        let payload = AlertPayload {
            session_id: session.id,
            timestamp: Utc::now(),
            location: enrichments.location.success().copied(),
            audio: enrichments.audio.success().cloned(),
            message: enrichments.message.success().cloned(),
        };
        info!("session {} dispatched", session.id);

        let id = session.id;
        let dispatcher = Arc::clone(&self.dispatcher);
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = dispatcher.send(payload).await;
            let _ = tx.send(Event::Dispatch { session: id, result }).await;
        });
    }

    fn on_capture(&mut self, id: SessionId, outcome: CaptureOutcome) {
        if self.session.as_ref().map(|s| s.id) != Some(id) {
            debug!("dropping capture result for stale session {}", id);
            return;
        }
        self.coordinator.settle(outcome);
    }

    fn on_dispatch(&mut self, id: SessionId, result: Result<(), DispatchError>) {
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!("dropping dispatch result for stale session {}", id);
            return;
        };
        session.dispatch = match result {
            Ok(()) => DispatchState::Sent,
            Err(err) => {
                warn!("session {} dispatch failed: {}", id, err);
                DispatchState::Failed(err)
            }
        };
    }

    fn publish(&self) {
        let snapshot = match &self.session {
            Some(session) => SessionSnapshot {
                session_id: Some(session.id),
                state: session.state,
                remaining_ticks: session.remaining_ticks,
                enrichments: self.coordinator.enrichments().clone(),
                dispatch: session.dispatch.clone(),
            },
            None => SessionSnapshot::default(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
