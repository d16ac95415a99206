//! Lifecycle controller: owns connect/disconnect and the single dispatch
//! point for everything that happens while connected.
//!
//! # Flow
//!
//! ```text
//! connect()
//!   ├─ resolve API key                 (Configuration error)
//!   ├─ AudioBackend::open_input        (Device error)
//!   ├─ AudioBackend::open_output       (suspended)
//!   ├─ Connector::open → await Opened  (Transport error)
//!   ├─ AudioOutput::resume             (failure only logged)
//!   └─ CapturePath::start              → Connected
//!
//! pump()  ── select ─┬─ SessionEvent   → handle_event
//!                    └─ SourceId ended → handle_source_ended
//!
//! disconnect()  ← explicit, Errored, Closed, Drop
//! ```
//!
//! Every teardown path funnels through [`LiveController::disconnect`], which
//! is idempotent.  The scheduler is only touched from `handle_*`, which all
//! run on the task driving the controller.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::state::{lock, new_shared_state, ConnectionState, LiveSnapshot, SharedState, StatusHandle};
use crate::audio::{AudioBackend, CapturePath, DeviceError, FrameProcessor, VolumeMeter};
use crate::config::AppConfig;
use crate::live::{Connector, LiveSession, SessionEvent, SessionSetup, TransportError};
use crate::playback::{AudioOutput, PlaybackBuffer, PlaybackScheduler, SourceEndedReceiver, SourceId};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Why `connect()` failed.  The `Display` text is what callers see in
/// `error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Configuration(String),

    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Connection error: {0}")]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// ActiveLink
// ---------------------------------------------------------------------------

/// Resources held while connected.  Present exactly when a session is open.
struct ActiveLink {
    session: LiveSession,
    capture: CapturePath,
    output: Box<dyn AudioOutput>,
    ended_rx: SourceEndedReceiver,
}

enum Dispatch {
    Event(SessionEvent),
    SourceEnded(SourceId),
}

// ---------------------------------------------------------------------------
// LiveController
// ---------------------------------------------------------------------------

/// Drives one live session at a time: devices, transport, playback and the
/// state callers observe.
pub struct LiveController {
    config: AppConfig,
    connector: Arc<dyn Connector>,
    audio: Arc<dyn AudioBackend>,
    state: SharedState,
    volume: VolumeMeter,
    scheduler: PlaybackScheduler,
    link: Option<ActiveLink>,
}

impl LiveController {
    /// A disconnected controller.  Nothing is opened until [`connect`].
    ///
    /// [`connect`]: LiveController::connect
    pub fn new(
        config: AppConfig,
        connector: Arc<dyn Connector>,
        audio: Arc<dyn AudioBackend>,
    ) -> Self {
        Self {
            config,
            connector,
            audio,
            state: new_shared_state(),
            volume: VolumeMeter::new(),
            scheduler: PlaybackScheduler::new(),
            link: None,
        }
    }

    // -----------------------------------------------------------------------
    // connect / disconnect
    // -----------------------------------------------------------------------

    /// Open a session and start streaming.
    ///
    /// A controller that is already connected is disconnected first.  On
    /// failure every resource acquired so far is released, the state returns
    /// to `Disconnected` and the error message is published.
    pub async fn connect(&mut self) -> Result<(), PipelineError> {
        if self.link.is_some() {
            log::info!("pipeline: connect while connected, tearing down old session");
            self.disconnect();
        }

        {
            let mut st = lock(&self.state);
            st.error = None;
            st.transcript.reset();
            st.speaking = false;
            st.connection = ConnectionState::Connecting;
        }
        log::debug!("pipeline: Disconnected → Connecting");

        match self.establish().await {
            Ok(link) => {
                self.link = Some(link);
                self.scheduler.reset();
                lock(&self.state).connection = ConnectionState::Connected;
                log::info!("pipeline: connected");
                Ok(())
            }
            Err(e) => {
                log::error!("pipeline: connect failed: {e}");
                let mut st = lock(&self.state);
                st.connection = ConnectionState::Disconnected;
                st.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Acquire devices and open the session, releasing whatever was already
    /// acquired if a later step fails.
    async fn establish(&self) -> Result<ActiveLink, PipelineError> {
        let api_key = self.config.live.resolve_api_key().ok_or_else(|| {
            PipelineError::Configuration(format!(
                "No API key configured: set {} or live.api_key in the settings file",
                self.config.live.api_key_env
            ))
        })?;

        let mut capture = CapturePath::new(self.audio.open_input()?);

        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let mut output = match self.audio.open_output(ended_tx) {
            Ok(output) => output,
            Err(e) => {
                capture.stop();
                return Err(e.into());
            }
        };

        let setup = SessionSetup::from_config(&self.config.live, api_key);
        let mut session = match open_session(self.connector.as_ref(), &setup).await {
            Ok(session) => session,
            Err(e) => {
                capture.stop();
                output.close();
                return Err(e.into());
            }
        };

        if let Err(e) = output.resume() {
            log::warn!("pipeline: could not resume audio output: {e}");
        }

        let processor = FrameProcessor::new(capture.sample_rate(), self.volume.clone(), session.sender());
        if let Err(e) = capture.start(processor, self.config.audio.capture_block_size) {
            capture.stop();
            output.close();
            session.close();
            return Err(e.into());
        }

        Ok(ActiveLink {
            session,
            capture,
            output,
            ended_rx,
        })
    }

    /// Tear everything down.  Safe to call any number of times.
    ///
    /// The last error message is kept so callers can still read it.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.capture.stop();
            self.scheduler.stop_all(link.output.as_mut());
            link.output.close();
            link.session.close();
            log::info!("pipeline: disconnected");
        }

        self.scheduler.reset();
        self.volume.reset();

        let mut st = lock(&self.state);
        st.connection = ConnectionState::Disconnected;
        st.speaking = false;
        st.transcript.reset();
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Wait for the next session event or playback completion and apply it.
    ///
    /// Returns `false` once there is no session left to pump.
    pub async fn pump(&mut self) -> bool {
        let Some(link) = self.link.as_mut() else {
            return false;
        };

        let next = tokio::select! {
            event = link.session.next_event() => {
                Dispatch::Event(event.unwrap_or(SessionEvent::Closed { reason: None }))
            }
            Some(id) = link.ended_rx.recv() => Dispatch::SourceEnded(id),
        };

        match next {
            Dispatch::Event(event) => self.handle_event(event),
            Dispatch::SourceEnded(id) => self.handle_source_ended(id),
        }
        self.link.is_some()
    }

    /// Pump until the session ends.
    pub async fn run(&mut self) {
        while self.pump().await {}
        log::info!("pipeline: session ended");
    }

    /// Apply one session event.  Events that need a live session are ignored
    /// once it has been torn down.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened => log::debug!("pipeline: duplicate open ignored"),
            SessionEvent::TranscriptDelta(text) => {
                if self.link.is_none() {
                    log::debug!("pipeline: transcript delta after teardown discarded");
                    return;
                }
                lock(&self.state).transcript.append(&text);
            }
            SessionEvent::AudioChunk { data } => self.play_chunk(&data),
            SessionEvent::Interrupted => {
                log::info!("pipeline: interrupted, cutting playback");
                if let Some(link) = self.link.as_mut() {
                    self.scheduler.stop_all(link.output.as_mut());
                }
                self.scheduler.reset();
                let mut st = lock(&self.state);
                st.transcript.reset();
                st.speaking = false;
            }
            SessionEvent::TurnComplete => log::debug!("pipeline: turn complete"),
            SessionEvent::Errored(message) => {
                log::error!("pipeline: session error: {message}");
                self.disconnect();
                lock(&self.state).error = Some(format!("Connection error: {message}"));
            }
            SessionEvent::Closed { reason } => {
                log::info!(
                    "pipeline: session closed ({})",
                    reason.as_deref().unwrap_or("no reason")
                );
                self.disconnect();
            }
        }
    }

    /// A playback source finished on its own.
    pub fn handle_source_ended(&mut self, id: SourceId) {
        if self.scheduler.source_ended(id) {
            lock(&self.state).speaking = self.scheduler.is_speaking();
        }
    }

    fn play_chunk(&mut self, data: &str) {
        let buffer = match PlaybackBuffer::from_base64(data) {
            Ok(buffer) => buffer,
            Err(e) => {
                log::warn!("pipeline: dropping audio chunk: {e}");
                return;
            }
        };

        let Some(link) = self.link.as_mut() else {
            log::debug!("pipeline: audio chunk after teardown discarded");
            return;
        };
        self.scheduler.schedule(link.output.as_mut(), buffer);
        lock(&self.state).speaking = self.scheduler.is_speaking();
    }

    // -----------------------------------------------------------------------
    // Caller-visible state
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn connection(&self) -> ConnectionState {
        lock(&self.state).connection
    }

    /// Shorthand for `connection().is_connected()`.
    pub fn is_connected(&self) -> bool {
        self.connection().is_connected()
    }

    /// True while model audio is playing.
    pub fn is_speaking(&self) -> bool {
        lock(&self.state).speaking
    }

    /// Last failure message, kept until the next `connect()`.
    pub fn error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }

    /// RMS of the latest microphone frame.
    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    /// Model speech transcribed so far this turn.
    pub fn transcript(&self) -> String {
        lock(&self.state).transcript.as_str().to_string()
    }

    /// All observable state read at once.
    pub fn snapshot(&self) -> LiveSnapshot {
        self.status_handle().snapshot()
    }

    /// A handle other threads can poll.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle::new(Arc::clone(&self.state), self.volume.clone())
    }
}

impl Drop for LiveController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Open a session and wait for the server to acknowledge it.
async fn open_session(
    connector: &dyn Connector,
    setup: &SessionSetup,
) -> Result<LiveSession, TransportError> {
    let mut session = connector.open(setup).await?;
    loop {
        match session.next_event().await {
            Some(SessionEvent::Opened) => return Ok(session),
            Some(SessionEvent::Errored(message)) => {
                session.close();
                return Err(TransportError::Rejected(message));
            }
            Some(SessionEvent::Closed { reason }) => {
                session.close();
                return Err(TransportError::ClosedBeforeOpen(reason));
            }
            Some(other) => log::debug!("pipeline: ignoring {other:?} before open"),
            None => return Err(TransportError::ChannelClosed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
