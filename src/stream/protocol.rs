// src/stream/protocol.rs
//
// Wire format of the frame channel.
//
//   client → server   one control message after connect: {"file_path": "<source>"}
//   server → client   binary: one JPEG frame per message
//                     text:   {"type": "frame_data", "data": {...}}
//                             {"error": "..."} when the source cannot be opened
//
// Text is parsed fail-closed: anything that is not a well-formed frame_data
// payload never reaches the session's detection state.

use crate::error::ProtocolError;
use crate::snapshot::DetectionSnapshot;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const FRAME_DATA_TYPE: &str = "frame_data";

/// Reserved source value that asks the backend for its live camera.
pub const LIVE_CAMERA_SENTINEL: &str = "0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// Path as the backend sees it (e.g. returned by an upload).
    File(String),
    LiveCamera,
}

impl StreamSource {
    /// Reads a configured source. `"0"` and `"webcam"` select the live camera,
    /// blank input selects nothing.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw {
            "" => None,
            LIVE_CAMERA_SENTINEL => Some(StreamSource::LiveCamera),
            s if s.eq_ignore_ascii_case("webcam") => Some(StreamSource::LiveCamera),
            s => Some(StreamSource::File(s.to_string())),
        }
    }

    pub fn control_value(&self) -> &str {
        match self {
            StreamSource::File(path) => path,
            StreamSource::LiveCamera => LIVE_CAMERA_SENTINEL,
        }
    }

    pub fn control_message(&self) -> ControlMessage<'_> {
        ControlMessage {
            file_path: self.control_value(),
        }
    }
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::File(path) => write!(f, "file '{}'", path),
            StreamSource::LiveCamera => f.write_str("live camera"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ControlMessage<'a> {
    pub file_path: &'a str,
}

impl ControlMessage<'_> {
    pub fn to_json(&self) -> String {
        // a single &str field cannot fail to serialize
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// A decoded text message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    FrameData(DetectionSnapshot),
    /// `{"error": ...}` sent by the backend, e.g. for an unknown file path.
    ServerError(String),
    /// Valid JSON without a recognised `type`. Carries the type if there was one.
    Unrecognized(Option<String>),
}

pub fn decode_text(text: &str) -> Result<ServerMessage, ProtocolError> {
    let mut value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

    let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
    match kind.as_deref() {
        Some(FRAME_DATA_TYPE) => {
            let data = value
                .get_mut("data")
                .map(Value::take)
                .unwrap_or(Value::Null);
            let snapshot =
                serde_json::from_value(data).map_err(ProtocolError::InvalidFrameData)?;
            Ok(ServerMessage::FrameData(snapshot))
        }
        Some(other) => Ok(ServerMessage::Unrecognized(Some(other.to_string()))),
        None => match value.get("error") {
            Some(Value::String(message)) => Ok(ServerMessage::ServerError(message.clone())),
            Some(other) => Ok(ServerMessage::ServerError(other.to_string())),
            None => Ok(ServerMessage::Unrecognized(None)),
        },
    }
}
