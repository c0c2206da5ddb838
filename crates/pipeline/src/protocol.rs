//! Twilio Media Streams wire protocol
//!
//! Every WebSocket text frame is one JSON object tagged by `event`. Inbound
//! audio is base64 mu-law at 8kHz mono; outbound audio uses the same format.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Events received from the media stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundEvent {
    /// Socket handshake notice
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },
    /// Stream metadata, sent once before any media
    Start { start: StartPayload },
    /// One chunk of caller audio
    Media { media: MediaPayload },
    /// Playback marker echoed back by the transport
    Mark {
        #[serde(default)]
        mark: Option<NamedPayload>,
    },
    /// Keypad digit
    Dtmf {
        #[serde(default)]
        dtmf: Option<DtmfPayload>,
    },
    /// Call ended
    Stop {
        #[serde(default)]
        stop: Option<StopPayload>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

impl StartPayload {
    /// `language` custom parameter set by the TwiML `<Parameter>`
    pub fn language(&self) -> Option<&str> {
        self.custom_parameters.get("language").map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaPayload {
    /// Base64 mu-law audio
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MediaPayload {
    /// Decode the audio bytes
    pub fn decode(&self) -> Result<Vec<u8>, PipelineError> {
        BASE64
            .decode(self.payload.as_bytes())
            .map_err(|e| PipelineError::Protocol(format!("Invalid media payload: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtmfPayload {
    #[serde(default)]
    pub digit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPayload {
    #[serde(default)]
    pub call_sid: Option<String>,
}

impl InboundEvent {
    /// Parse one text frame
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(text).map_err(|e| PipelineError::Protocol(e.to_string()))
    }

    /// Build a `start` event
    pub fn start(stream_sid: impl Into<String>, language: Option<&str>) -> Self {
        let mut custom_parameters = HashMap::new();
        if let Some(language) = language {
            custom_parameters.insert("language".to_string(), language.to_string());
        }

        InboundEvent::Start {
            start: StartPayload {
                stream_sid: stream_sid.into(),
                call_sid: None,
                account_sid: None,
                tracks: vec!["inbound".to_string()],
                custom_parameters,
            },
        }
    }

    /// Build a `media` event carrying raw mu-law bytes
    pub fn media(audio: &[u8]) -> Self {
        InboundEvent::Media {
            media: MediaPayload {
                payload: BASE64.encode(audio),
                track: Some("inbound".to_string()),
                chunk: None,
                timestamp: None,
            },
        }
    }

    pub fn stop() -> Self {
        InboundEvent::Stop { stop: None }
    }

    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Connected { .. } => "connected",
            InboundEvent::Start { .. } => "start",
            InboundEvent::Media { .. } => "media",
            InboundEvent::Mark { .. } => "mark",
            InboundEvent::Dtmf { .. } => "dtmf",
            InboundEvent::Stop { .. } => "stop",
        }
    }
}

/// Messages sent back on the media stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Drop any audio the transport still has queued
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl OutboundMessage {
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        OutboundMessage::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: BASE64.encode(audio),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        OutboundMessage::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, PipelineError> {
        serde_json::to_string(self).map_err(|e| PipelineError::Protocol(e.to_string()))
    }

    /// Decoded audio of a media message
    pub fn audio(&self) -> Option<Vec<u8>> {
        match self {
            OutboundMessage::Media { media, .. } => BASE64.decode(media.payload.as_bytes()).ok(),
            OutboundMessage::Clear { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        let text = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ123",
                "callSid": "CA456",
                "accountSid": "AC789",
                "tracks": ["inbound"],
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1},
                "customParameters": {"language": "hi-IN"}
            },
            "streamSid": "MZ123"
        }"#;

        match InboundEvent::parse(text).unwrap() {
            InboundEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ123");
                assert_eq!(start.call_sid.as_deref(), Some("CA456"));
                assert_eq!(start.language(), Some("hi-IN"));
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_media() {
        let text = r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"1","timestamp":"5","payload":"//8A"},"streamSid":"MZ123"}"#;

        match InboundEvent::parse(text).unwrap() {
            InboundEvent::Media { media } => {
                assert_eq!(media.decode().unwrap(), vec![0xFF, 0xFF, 0x00]);
                assert_eq!(media.chunk.as_deref(), Some("1"));
            },
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_other_events() {
        assert_eq!(
            InboundEvent::parse(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#)
                .unwrap()
                .name(),
            "connected"
        );
        assert_eq!(
            InboundEvent::parse(r#"{"event":"mark","mark":{"name":"reply"}}"#).unwrap().name(),
            "mark"
        );
        assert_eq!(
            InboundEvent::parse(r#"{"event":"dtmf","dtmf":{"track":"inbound_track","digit":"1"}}"#)
                .unwrap()
                .name(),
            "dtmf"
        );
        assert_eq!(
            InboundEvent::parse(r#"{"event":"stop","stop":{"callSid":"CA1"}}"#).unwrap(),
            InboundEvent::Stop {
                stop: Some(StopPayload {
                    call_sid: Some("CA1".to_string())
                })
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(InboundEvent::parse("not json"), Err(PipelineError::Protocol(_))));
        assert!(InboundEvent::parse(r#"{"event":"unknown"}"#).is_err());
        assert!(InboundEvent::parse(r#"{"event":"media"}"#).is_err());
    }

    #[test]
    fn test_bad_base64() {
        let media = MediaPayload {
            payload: "***".to_string(),
            track: None,
            chunk: None,
            timestamp: None,
        };
        assert!(media.decode().is_err());
    }

    #[test]
    fn test_outbound_json() {
        let media = OutboundMessage::media("MZ1", &[0xFF, 0xFF, 0x00]);
        let json: serde_json::Value = serde_json::from_str(&media.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "//8A"}})
        );
        assert_eq!(media.audio(), Some(vec![0xFF, 0xFF, 0x00]));

        let clear = OutboundMessage::clear("MZ1").to_json().unwrap();
        assert_eq!(clear, r#"{"event":"clear","streamSid":"MZ1"}"#);
    }

    #[test]
    fn test_constructors_round_trip_through_json() {
        let start = InboundEvent::start("MZ9", Some("en-IN"));
        match start {
            InboundEvent::Start { ref start } => assert_eq!(start.language(), Some("en-IN")),
            _ => unreachable!(),
        }

        match InboundEvent::media(&[1, 2, 3]) {
            InboundEvent::Media { media } => assert_eq!(media.decode().unwrap(), vec![1, 2, 3]),
            _ => unreachable!(),
        }
    }
}
