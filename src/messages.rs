//! Message types for the Fish Audio live TTS WebSocket protocol.
//!
//! Every frame is a binary WebSocket message holding a MessagePack map with an
//! `event` field naming its kind.

use serde::{Deserialize, Serialize};

use crate::error::{Error, TransportError};
use crate::types::{AudioFormat, LatencyMode, Prosody, ReferenceAudio, SessionConfig};

// ============================================================================
// Outbound
// ============================================================================

/// Synthesis request carried by the start event.
///
/// Text is always empty here; it arrives later through text events.
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest<'a> {
    pub text: &'a str,
    pub chunk_length: u32,
    pub format: AudioFormat,
    pub sample_rate: Option<u32>,
    pub mp3_bitrate: u32,
    pub opus_bitrate: i32,
    pub references: &'a [ReferenceAudio],
    pub reference_id: Option<&'a str>,
    pub normalize: bool,
    pub latency: LatencyMode,
    pub prosody: Option<&'a Prosody>,
    pub top_p: f32,
    pub temperature: f32,
    pub max_new_tokens: u32,
    pub repetition_penalty: f32,
    pub min_chunk_length: u32,
    pub condition_on_previous_chunks: bool,
    pub early_stop_threshold: f32,
}

impl<'a> From<&'a SessionConfig> for StartRequest<'a> {
    fn from(config: &'a SessionConfig) -> Self {
        Self {
            text: "",
            chunk_length: config.chunk_length,
            format: config.format,
            sample_rate: config.sample_rate,
            mp3_bitrate: config.mp3_bitrate,
            opus_bitrate: config.opus_bitrate,
            references: &config.references,
            reference_id: config.reference_id.as_deref(),
            normalize: config.normalize,
            latency: config.latency,
            prosody: config.prosody.as_ref(),
            top_p: config.top_p,
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
            repetition_penalty: config.repetition_penalty,
            min_chunk_length: config.min_chunk_length,
            condition_on_previous_chunks: config.condition_on_previous_chunks,
            early_stop_threshold: config.early_stop_threshold,
        }
    }
}

/// Events sent by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientEvent<'a> {
    /// Opens synthesis with the session configuration. Sent once.
    Start { request: StartRequest<'a> },
    /// One text fragment.
    Text { text: &'a str },
    /// Synthesize buffered text without waiting for more.
    Flush,
    /// No more text will follow.
    Stop,
}

impl ClientEvent<'_> {
    /// Encodes the event as a MessagePack map.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Start { .. } => "start",
            ClientEvent::Text { .. } => "text",
            ClientEvent::Flush => "flush",
            ClientEvent::Stop => "stop",
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Just the event name, used for the first decoding pass.
#[derive(Debug, Deserialize)]
struct EventHeader {
    event: String,
}

#[derive(Debug, Deserialize)]
struct AudioMessage {
    #[serde(with = "serde_bytes")]
    audio: Vec<u8>,
    #[serde(default)]
    seq: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FinishMessage {
    reason: FinishReason,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i32>,
}

/// Why the service finished the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// All submitted text was synthesized.
    Stop,
    /// Synthesis failed.
    Error,
}

/// Events received from the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Synthesized audio.
    Audio {
        audio: Vec<u8>,
        /// Position marker, when the service provides one.
        seq: Option<u64>,
    },
    /// End of synthesis.
    Finish {
        reason: FinishReason,
        message: Option<String>,
        code: Option<i32>,
    },
    /// An event this client does not act on.
    Other(String),
}

impl ServerEvent {
    /// Decodes one binary frame.
    pub fn decode(frame: &[u8]) -> Result<Self, TransportError> {
        let header: EventHeader = rmp_serde::from_slice(frame)?;

        match header.event.as_str() {
            "audio" => {
                let msg: AudioMessage = rmp_serde::from_slice(frame)?;
                Ok(ServerEvent::Audio {
                    audio: msg.audio,
                    seq: msg.seq,
                })
            }
            "finish" => {
                let msg: FinishMessage = rmp_serde::from_slice(frame)?;
                Ok(ServerEvent::Finish {
                    reason: msg.reason,
                    message: msg.message,
                    code: msg.code,
                })
            }
            _ => Ok(ServerEvent::Other(header.event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        event: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        request: Option<RequestProbe>,
    }

    #[derive(Debug, Deserialize)]
    struct RequestProbe {
        text: String,
        format: String,
        latency: String,
        reference_id: Option<String>,
        chunk_length: u32,
        prosody: Option<Prosody>,
        references: Vec<ReferenceAudio>,
    }

    #[derive(Serialize)]
    struct AudioOut<'a> {
        event: &'a str,
        #[serde(with = "serde_bytes")]
        audio: &'a [u8],
    }

    #[derive(Serialize)]
    struct FinishOut<'a> {
        event: &'a str,
        reason: &'a str,
    }

    #[test]
    fn test_start_event_carries_config() {
        let mut config = SessionConfig::for_voice("v1")
            .with_format(AudioFormat::Wav)
            .with_speed(1.25);
        config.references.push(ReferenceAudio {
            audio: vec![1, 2, 3],
            text: "sample".to_string(),
        });

        let bytes = ClientEvent::Start {
            request: StartRequest::from(&config),
        }
        .encode()
        .unwrap();
        let probe: Probe = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(probe.event, "start");
        let request = probe.request.unwrap();
        assert_eq!(request.text, "");
        assert_eq!(request.format, "wav");
        assert_eq!(request.latency, "balanced");
        assert_eq!(request.reference_id.as_deref(), Some("v1"));
        assert_eq!(request.chunk_length, 200);
        assert_eq!(request.prosody.unwrap().speed, 1.25);
        assert_eq!(request.references[0].audio, vec![1, 2, 3]);
    }

    #[test]
    fn test_text_and_control_events() {
        let text = ClientEvent::Text { text: "Hello" }.encode().unwrap();
        let probe: Probe = rmp_serde::from_slice(&text).unwrap();
        assert_eq!(probe.event, "text");
        assert_eq!(probe.text.as_deref(), Some("Hello"));

        let flush: Probe = rmp_serde::from_slice(&ClientEvent::Flush.encode().unwrap()).unwrap();
        assert_eq!(flush.event, "flush");

        let stop: Probe = rmp_serde::from_slice(&ClientEvent::Stop.encode().unwrap()).unwrap();
        assert_eq!(stop.event, "stop");
        assert!(stop.text.is_none());
    }

    #[test]
    fn test_decode_audio() {
        let frame = rmp_serde::to_vec_named(&AudioOut {
            event: "audio",
            audio: b"RIFF",
        })
        .unwrap();

        assert_eq!(
            ServerEvent::decode(&frame).unwrap(),
            ServerEvent::Audio {
                audio: b"RIFF".to_vec(),
                seq: None
            }
        );
    }

    #[test]
    fn test_decode_finish() {
        let stop = rmp_serde::to_vec_named(&FinishOut {
            event: "finish",
            reason: "stop",
        })
        .unwrap();
        assert!(matches!(
            ServerEvent::decode(&stop).unwrap(),
            ServerEvent::Finish {
                reason: FinishReason::Stop,
                ..
            }
        ));

        let error = rmp_serde::to_vec_named(&FinishOut {
            event: "finish",
            reason: "error",
        })
        .unwrap();
        assert!(matches!(
            ServerEvent::decode(&error).unwrap(),
            ServerEvent::Finish {
                reason: FinishReason::Error,
                message: None,
                code: None
            }
        ));
    }

    #[test]
    fn test_decode_unknown_and_malformed() {
        let log = rmp_serde::to_vec_named(&FinishOut {
            event: "log",
            reason: "whatever",
        })
        .unwrap();
        assert_eq!(
            ServerEvent::decode(&log).unwrap(),
            ServerEvent::Other("log".to_string())
        );

        assert!(matches!(
            ServerEvent::decode(b"not msgpack"),
            Err(TransportError::Malformed(_))
        ));

        let bad_reason = rmp_serde::to_vec_named(&FinishOut {
            event: "finish",
            reason: "later",
        })
        .unwrap();
        assert!(matches!(
            ServerEvent::decode(&bad_reason),
            Err(TransportError::Malformed(_))
        ));
    }
}
