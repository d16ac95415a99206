//! Websocket transport for the live endpoint, built on `tokio-tungstenite`.
//!
//! [`WebSocketConnector::open`] connects, writes the setup frame, then splits
//! the socket into two tokio tasks:
//!
//! ```text
//! PacketSender ──▶ write_loop ──▶ socket ──▶ read_loop ──▶ SessionEvent channel
//!                      │                                        ▲
//!                      └──────────── write errors ──────────────┘
//! ```
//!
//! Neither task ever touches pipeline state; they only translate between
//! frames and channel messages.

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::protocol::{RealtimeInputMessage, ServerMessage, SetupMessage};
use super::session::{
    Connector, LiveSession, Outbound, PacketSender, SessionEvent, SessionSetup, TransportError,
};

/// Opens sessions over a websocket.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

/// `endpoint?key=...`, appending with `&` when the endpoint already has a query.
pub fn session_url(setup: &SessionSetup) -> String {
    let separator = if setup.endpoint.contains('?') { '&' } else { '?' };
    format!("{}{separator}key={}", setup.endpoint, setup.api_key)
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, setup: &SessionSetup) -> Result<LiveSession, TransportError> {
        log::info!("live: connecting to {}", setup.endpoint);
        let (socket, _response) = tokio_tungstenite::connect_async(session_url(setup)).await?;
        let (mut sink, stream) = socket.split();

        let setup_frame = serde_json::to_string(&SetupMessage::from(setup))?;
        sink.send(Message::Text(setup_frame)).await?;
        log::debug!("live: setup sent for {}", setup.qualified_model());

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sink, out_rx, ev_tx.clone()));
        tokio::spawn(read_loop(stream, ev_tx));

        Ok(LiveSession::new(PacketSender::new(out_tx), ev_rx))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Drain outbound commands into the socket until `Close` or the sender is
/// dropped.  A failed write is reported as [`SessionEvent::Errored`].
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SessionEvent>,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(command) = outbound.recv().await {
        match command {
            Outbound::Audio(packet) => {
                let frame = match serde_json::to_string(&RealtimeInputMessage::new(&packet)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("live: dropping unencodable packet: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    log::error!("live: send failed: {e}");
                    let _ = events.send(SessionEvent::Errored(e.to_string()));
                    return;
                }
            }
            Outbound::Close => break,
        }
    }

    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(close))).await {
        log::debug!("live: close frame not delivered: {e}");
    }
    log::debug!("live: writer stopped");
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Translate inbound frames into session events until the socket closes.
async fn read_loop<S>(mut stream: S, events: mpsc::UnboundedSender<SessionEvent>)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(frame)) => {
                let _ = events.send(close_event(frame));
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                let _ = events.send(SessionEvent::Errored(e.to_string()));
                return;
            }
        };

        match ServerMessage::parse(&payload) {
            Ok(message) => {
                for event in message.into_events() {
                    if events.send(event).is_err() {
                        log::debug!("live: session dropped, reader stopping");
                        return;
                    }
                }
            }
            Err(e) => log::warn!("live: skipping unparseable server message: {e}"),
        }
    }

    let _ = events.send(SessionEvent::Closed { reason: None });
}

fn close_event(frame: Option<CloseFrame<'_>>) -> SessionEvent {
    match frame {
        None => SessionEvent::Closed { reason: None },
        Some(frame) => {
            let reason = (!frame.reason.is_empty()).then(|| frame.reason.to_string());
            if frame.code == CloseCode::Normal || frame.code == CloseCode::Away {
                SessionEvent::Closed { reason }
            } else {
                SessionEvent::Errored(format!(
                    "closed with code {}: {}",
                    u16::from(frame.code),
                    reason.as_deref().unwrap_or("no reason given")
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::EncodedPacket;
    use crate::config::LiveConfig;
    use tokio::net::TcpListener;

    fn setup_for(addr: std::net::SocketAddr) -> SessionSetup {
        let config = LiveConfig {
            endpoint: format!("ws://{addr}/live"),
            model: "gemini-test".into(),
            ..LiveConfig::default()
        };
        SessionSetup::from_config(&config, "test-key".into())
    }

    #[test]
    fn url_appends_key() {
        let mut s = SessionSetup::from_config(&LiveConfig::default(), "abc".into());
        s.endpoint = "wss://host/path".into();
        assert_eq!(session_url(&s), "wss://host/path?key=abc");
        s.endpoint = "wss://host/path?alt=1".into();
        assert_eq!(session_url(&s), "wss://host/path?alt=1&key=abc");
    }

    #[test]
    fn close_codes_map_to_events() {
        assert_eq!(close_event(None), SessionEvent::Closed { reason: None });

        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        assert_eq!(
            close_event(Some(normal)),
            SessionEvent::Closed {
                reason: Some("bye".into())
            }
        );

        let policy = CloseFrame {
            code: CloseCode::Policy,
            reason: "API key not valid".into(),
        };
        match close_event(Some(policy)) {
            SessionEvent::Errored(message) => {
                assert!(message.contains("1008"));
                assert!(message.contains("API key not valid"));
            }
            other => panic!("expected Errored, got {other:?}"),
        }
    }

    /// Full exchange against a local websocket server: setup frame, setup
    /// complete, inbound audio + transcript, outbound packet, close.
    #[tokio::test]
    async fn session_round_trip_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let setup = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("expected setup frame, got {other:?}"),
            };

            ws.send(Message::Binary(br#"{"setupComplete":{}}"#.to_vec()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"serverContent":{"outputTranscription":{"text":"Hi"},
                    "modelTurn":{"parts":[{"inlineData":{"data":"AAAA"}}]}}}"#
                    .into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.send(Message::Text(r#"{"serverContent":{"interrupted":true}}"#.into()))
                .await
                .unwrap();

            let input = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                other => panic!("expected realtime input, got {other:?}"),
            };

            let closed_by_client = matches!(ws.next().await, Some(Ok(Message::Close(_))));
            (setup, input, closed_by_client)
        });

        let connector = WebSocketConnector::new();
        let mut session = connector.open(&setup_for(addr)).await.unwrap();

        assert_eq!(session.next_event().await, Some(SessionEvent::Opened));
        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::TranscriptDelta("Hi".into()))
        );
        assert_eq!(
            session.next_event().await,
            Some(SessionEvent::AudioChunk {
                data: "AAAA".into()
            })
        );
        // The garbage frame is skipped rather than ending the session.
        assert_eq!(session.next_event().await, Some(SessionEvent::Interrupted));

        let packet = EncodedPacket::from_samples(&[0.25, -0.25]);
        assert!(session.sender().send(packet.clone()));
        session.close();

        let (setup, input, closed_by_client) = server.await.unwrap();

        let setup: serde_json::Value = serde_json::from_str(&setup).unwrap();
        assert_eq!(setup["setup"]["model"], "models/gemini-test");

        let input: serde_json::Value = serde_json::from_str(&input).unwrap();
        assert_eq!(
            input["realtimeInput"]["mediaChunks"][0]["data"],
            packet.data.as_str()
        );
        assert!(closed_by_client);
    }

    #[tokio::test]
    async fn server_error_close_surfaces_as_errored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let _setup = ws.next().await;
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "quota exceeded".into(),
                }))
                .await;
        });

        let mut session = WebSocketConnector::new()
            .open(&setup_for(addr))
            .await
            .unwrap();

        match session.next_event().await {
            Some(SessionEvent::Errored(message)) => assert!(message.contains("quota exceeded")),
            other => panic!("expected Errored, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_open() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();

        let result = WebSocketConnector::new().open(&setup_for(addr)).await;
        assert!(matches!(result, Err(TransportError::WebSocket(_))));
    }
}
