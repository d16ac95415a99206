//! Transport-agnostic session contract.
//!
//! A [`Connector`] opens a [`LiveSession`], which is the only handle the
//! pipeline holds on the remote speech service.  The session has two halves:
//!
//! * [`PacketSender`]: typed, fire-and-forget `send` / `close`.  Cheap to
//!   clone; the capture callback owns one.
//! * an inbound event receiver: every lifecycle hook and server message is
//!   flattened into [`SessionEvent`]s on one ordered channel.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::EncodedPacket;
use crate::config::LiveConfig;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Failures opening, writing to, or reading from the live session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode session message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The server reported an error before the session opened.
    #[error("session rejected: {0}")]
    Rejected(String),

    #[error("session closed before it opened{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    ClosedBeforeOpen(Option<String>),

    #[error("session channel closed")]
    ChannelClosed,
}

// ---------------------------------------------------------------------------
// SessionSetup
// ---------------------------------------------------------------------------

/// Everything needed to open one session.
#[derive(Clone)]
pub struct SessionSetup {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub output_transcription: bool,
}

impl SessionSetup {
    pub fn from_config(config: &LiveConfig, api_key: String) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            voice: config.voice.clone(),
            system_instruction: config.system_instruction.clone(),
            output_transcription: config.output_transcription,
        }
    }

    /// Model id in the `models/<name>` form the service expects.
    pub fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

impl fmt::Debug for SessionSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSetup")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("output_transcription", &self.output_transcription)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// One inbound occurrence on the session, in arrival order.
///
/// A single server message can expand into several events; they are emitted
/// in the order transcript → audio → interruption → turn complete.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Setup acknowledged; the session is ready to stream.
    Opened,
    /// Base64 PCM16 @ 24 kHz mono.
    AudioChunk { data: String },
    /// Text delta of the model's own speech.
    TranscriptDelta(String),
    /// The user barged in; pending model audio must be cut.
    Interrupted,
    /// The model finished its turn.
    TurnComplete,
    /// Transport or server error.  The session is unusable afterwards.
    Errored(String),
    /// Orderly close.
    Closed { reason: Option<String> },
}

// ---------------------------------------------------------------------------
// PacketSender
// ---------------------------------------------------------------------------

/// Outbound command consumed by the transport's writer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Audio(EncodedPacket),
    Close,
}

/// Fire-and-forget outbound handle.
///
/// `send` never blocks and never waits for the network; packets queue on an
/// unbounded channel drained by the transport.
#[derive(Debug, Clone)]
pub struct PacketSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PacketSender {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Queue `packet` for transmission.  Returns `false` once the transport is
    /// gone; callers on the audio thread simply drop the packet.
    pub fn send(&self, packet: EncodedPacket) -> bool {
        self.tx.send(Outbound::Audio(packet)).is_ok()
    }

    /// Ask the transport to close the session.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// LiveSession
// ---------------------------------------------------------------------------

/// An open session: outbound sender plus the ordered inbound event stream.
pub struct LiveSession {
    sender: PacketSender,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl LiveSession {
    pub fn new(sender: PacketSender, events: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { sender, events }
    }

    /// A clone of the outbound handle.
    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    /// Next inbound event, or `None` once the transport has shut down.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Close the session.  Safe to call more than once.
    pub fn close(&mut self) {
        self.sender.close();
        self.events.close();
    }
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Connector trait
// ---------------------------------------------------------------------------

/// Opens live sessions.
///
/// `open` resolves once the transport is connected and the setup request
/// has been written.  The pipeline then waits for [`SessionEvent::Opened`]
/// before streaming.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, setup: &SessionSetup) -> Result<LiveSession, TransportError>;
}

// ---------------------------------------------------------------------------
// MockConnector (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::{MockConnector, MockRemote};


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SessionSetup {
        SessionSetup::from_config(&LiveConfig::default(), "k".into())
    }

    #[test]
    fn model_gets_models_prefix_once() {
        let mut s = setup();
        s.model = "gemini-x".into();
        assert_eq!(s.qualified_model(), "models/gemini-x");
        s.model = "models/gemini-x".into();
        assert_eq!(s.qualified_model(), "models/gemini-x");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let mut s = setup();
        s.api_key = "super-secret".into();
        let text = format!("{s:?}");
        assert!(!text.contains("super-secret"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn closed_before_open_message() {
        assert_eq!(
            TransportError::ClosedBeforeOpen(None).to_string(),
            "session closed before it opened"
        );
        assert_eq!(
            TransportError::ClosedBeforeOpen(Some("quota".into())).to_string(),
            "session closed before it opened: quota"
        );
    }

    #[test]
    fn sender_reports_dropped_transport() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = PacketSender::new(tx);
        assert!(sender.send(EncodedPacket::from_samples(&[0.0])));
        drop(rx);
        assert!(!sender.send(EncodedPacket::from_samples(&[0.0])));
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn session_close_is_idempotent_and_ends_events() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (_ev_tx, ev_rx) = mpsc::unbounded_channel();
        let mut session = LiveSession::new(PacketSender::new(out_tx), ev_rx);

        session.close();
        session.close();

        assert_eq!(out_rx.recv().await, Some(Outbound::Close));
        assert_eq!(session.next_event().await, None);
    }

    #[tokio::test]
    async fn mock_connector_hands_out_remote() {
        let connector = MockConnector::new();
        let mut session = connector.open(&setup()).await.unwrap();
        let mut remote = connector.take_remote();
        assert_eq!(session.next_event().await, Some(SessionEvent::Opened));

        remote.emit(SessionEvent::TurnComplete);
        assert_eq!(session.next_event().await, Some(SessionEvent::TurnComplete));

        session.sender().send(EncodedPacket::from_samples(&[0.5]));
        assert!(matches!(remote.drain_outbound().as_slice(), [Outbound::Audio(_)]));
        assert_eq!(connector.open_count(), 1);
    }
}
