//! Pipeline: wires capture, the live session and playback together and
//! exposes the state callers observe.
//!
//! # Architecture
//!
//! ```text
//! mic ─▶ CapturePath ─▶ PacketSender ─▶ (remote) ─▶ SessionEvent ─┐
//!                                                                 ▼
//!                                   LiveController::pump() ── handle_event
//!                                        ▲                       │
//!              SourceEndedSender ────────┘            PlaybackScheduler ─▶ speaker
//!
//! SharedState (Arc<Mutex<LiveState>>) + VolumeMeter ◀── StatusHandle::snapshot()
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use live_voice::audio::CpalBackend;
//! use live_voice::config::AppConfig;
//! use live_voice::live::WebSocketConnector;
//! use live_voice::pipeline::LiveController;
//!
//! # async fn example() -> Result<(), live_voice::pipeline::PipelineError> {
//! let config = AppConfig::load().unwrap_or_default();
//! let backend = CpalBackend::new(config.audio.clone());
//! let mut controller =
//!     LiveController::new(config, Arc::new(WebSocketConnector::new()), Arc::new(backend));
//!
//! controller.connect().await?;
//! controller.run().await; // until the session closes
//! controller.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod state;
pub mod transcript;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use controller::{LiveController, PipelineError};
pub use state::{
    new_shared_state, ConnectionState, LiveSnapshot, LiveState, SharedState, StatusHandle,
};
pub use transcript::Transcript;
