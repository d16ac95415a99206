//! JSON message shapes of the bidirectional live endpoint.
//!
//! Only the fields this pipeline produces or consumes are modelled; unknown
//! fields in server messages are ignored.

use serde::{Deserialize, Serialize};

use super::session::{SessionEvent, SessionSetup};
use crate::audio::EncodedPacket;

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// First frame on the socket.
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    /// Present (as an empty object) only when output transcription is wanted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<EmptyObject>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EmptyObject {}

impl From<&SessionSetup> for SetupMessage {
    fn from(setup: &SessionSetup) -> Self {
        Self {
            setup: Setup {
                model: setup.qualified_model(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: setup.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![Part {
                        text: Some(setup.system_instruction.clone()),
                        inline_data: None,
                    }],
                },
                output_audio_transcription: setup
                    .output_transcription
                    .then(EmptyObject::default),
            },
        }
    }
}

/// Streaming microphone input.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage<'a> {
    pub realtime_input: RealtimeInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput<'a> {
    pub media_chunks: [&'a EncodedPacket; 1],
}

impl<'a> RealtimeInputMessage<'a> {
    pub fn new(packet: &'a EncodedPacket) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: [packet],
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Shared content shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<EmptyObject>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Flatten into session events: opened, transcript, audio, interrupted,
    /// turn complete.
    pub fn into_events(self) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(SessionEvent::Opened);
        }

        if let Some(content) = self.server_content {
            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                if !text.is_empty() {
                    events.push(SessionEvent::TranscriptDelta(text));
                }
            }

            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|part| part.inline_data)
                        .map(|blob| SessionEvent::AudioChunk { data: blob.data }),
                );
            }

            if content.interrupted {
                events.push(SessionEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(SessionEvent::TurnComplete);
            }
        }

        if let Some(go_away) = self.go_away {
            log::warn!(
                "live: server will close the session soon (time left: {})",
                go_away.time_left.as_deref().unwrap_or("unknown")
            );
        }

        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
