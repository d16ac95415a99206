//! Live speech session: the bidirectional link to the remote speech service.
//!
//! # Architecture
//!
//! ```text
//! Connector::open(SessionSetup) ──▶ LiveSession
//!                                     ├─ PacketSender  (capture → remote)
//!                                     └─ next_event()  (remote → SessionEvent)
//! ```
//!
//! [`WebSocketConnector`] is the production connector.  Tests use the
//! channel-backed `MockConnector`.

pub mod protocol;
pub mod session;
pub mod websocket;

pub use session::{
    Connector, LiveSession, Outbound, PacketSender, SessionEvent, SessionSetup, TransportError,
};
pub use websocket::WebSocketConnector;

#[cfg(test)]
pub use session::{MockConnector, MockRemote};
