//! Connection state and the caller-visible pipeline state.
//!
//! [`LiveState`] is the single source of truth for everything a caller can
//! observe: connection phase, speaking flag, last error and the transcript.
//! The volume lives in a [`VolumeMeter`] beside it because the capture thread
//! writes it on every frame.
//!
//! [`SharedState`] is `Arc<Mutex<LiveState>>`; [`StatusHandle`] bundles it
//! with the meter so other threads can poll a [`LiveSnapshot`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::transcript::Transcript;
use crate::audio::VolumeMeter;

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle of the live link.
///
/// ```text
/// Disconnected ──connect()──▶ Connecting ──session opened──▶ Connected
///      ▲                          │                              │
///      └──────── failure ─────────┘                              │
///      └──────────── disconnect() / error / close ───────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// ```
    /// use live_voice::pipeline::ConnectionState;
    ///
    /// assert!(ConnectionState::Connected.is_connected());
    /// assert!(!ConnectionState::Connecting.is_connected());
    /// ```
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }
}

// ---------------------------------------------------------------------------
// LiveState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct LiveState {
    pub connection: ConnectionState,
    /// At least one playback source is active.
    pub speaking: bool,
    /// Message of the last failure.  Cleared by the next `connect()`.
    pub error: Option<String>,
    pub transcript: Transcript,
}

/// Thread-safe handle to [`LiveState`].  Do not hold the lock across
/// `.await` points.
pub type SharedState = Arc<Mutex<LiveState>>;

pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(LiveState::default()))
}

/// Lock `state`, recovering the data if a previous holder panicked.
pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, LiveState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// LiveSnapshot / StatusHandle
// ---------------------------------------------------------------------------

/// Point-in-time copy of everything a caller can observe.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    pub connection: ConnectionState,
    pub is_connected: bool,
    pub is_speaking: bool,
    pub error: Option<String>,
    pub volume: f32,
    pub transcript: String,
}

/// Read-only, cloneable view of a controller's state.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    state: SharedState,
    volume: VolumeMeter,
}

impl StatusHandle {
    pub fn new(state: SharedState, volume: VolumeMeter) -> Self {
        Self { state, volume }
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        let st = lock(&self.state);
        LiveSnapshot {
            connection: st.connection,
            is_connected: st.connection.is_connected(),
            is_speaking: st.speaking,
            error: st.error.clone(),
            volume: self.volume.get(),
            transcript: st.transcript.as_str().to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connection.is_connected()
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
