//! Gateway protocol schema
//!
//! Defines the wire format for frames exchanged with the gateway and the
//! pure decode step that splits inbound frames into call responses and
//! push events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Tag;
use crate::error::{Error, Result};

/// Status code the gateway uses for success
pub const STATUS_OK: i64 = 0;

/// Outbound call envelope, sent as one text frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    /// Correlation tag
    pub sync_id: Tag,
    /// Normalized verb name
    pub command: String,
    /// Optional subcommand; serialized as `null` when absent
    pub subcommand: Option<Subcommand>,
    /// Normalized parameters
    pub content: Map<String, Value>,
}

/// Subcommands accepted by configuration-style verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subcommand {
    /// Read the current value
    Get,
    /// Write a new value
    Update,
}

impl std::fmt::Display for Subcommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subcommand::Get => write!(f, "get"),
            Subcommand::Update => write!(f, "update"),
        }
    }
}

impl std::str::FromStr for Subcommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "get" => Ok(Subcommand::Get),
            "update" => Ok(Subcommand::Update),
            _ => Err(Error::InvalidInput(format!(
                "Invalid subcommand: {}. Valid options: get, update",
                s
            ))),
        }
    }
}

/// An inbound frame after classification
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Answer to an outstanding call; `frame` is the whole decoded object
    Response {
        /// Correlation tag
        tag: Tag,
        /// The full frame
        frame: Value,
    },
    /// Server-initiated event; `data` is the frame's `data` object
    Push {
        /// Event payload
        data: Value,
    },
}

/// Classify a raw text frame.
///
/// A frame whose `syncId` reads as an integer >= 0 is a call response. The
/// gateway sends `syncId` either as a number or as a numeric string; absent,
/// null, empty or negative values mark a push event.
pub fn classify(text: &str) -> Result<InboundFrame> {
    let frame: Value = serde_json::from_str(text)
        .map_err(|e| Error::Decode(format!("Frame is not valid JSON: {}", e)))?;

    if !frame.is_object() {
        return Err(Error::Decode(format!("Frame is not a JSON object: {}", text)));
    }

    match sync_id_of(&frame)? {
        Some(id) if id >= 0 => Ok(InboundFrame::Response {
            tag: id as Tag,
            frame,
        }),
        _ => {
            let data = match frame {
                Value::Object(mut map) => map.remove("data"),
                _ => None,
            }
            .ok_or_else(|| Error::Decode("Push frame has no 'data' field".to_string()))?;
            Ok(InboundFrame::Push { data })
        }
    }
}

fn sync_id_of(frame: &Value) -> Result<Option<i64>> {
    match frame.get("syncId") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::Decode(format!("syncId {} is not an integer", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| Error::Decode(format!("syncId '{}' is not an integer", s))),
        Some(other) => Err(Error::Decode(format!("syncId has unexpected type: {}", other))),
    }
}

/// Result of the first frame on a fresh connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Identity accepted
    Accepted,
    /// Identity refused; not worth retrying
    Rejected {
        /// Status code
        code: i64,
        /// Gateway message
        message: String,
    },
}

impl HandshakeOutcome {
    /// Interpret the first inbound frame.
    ///
    /// Fails only if the frame is not JSON; a frame without `data.code`
    /// counts as accepted.
    pub fn from_frame(text: &str) -> Result<Self> {
        let frame: Value = serde_json::from_str(text)
            .map_err(|e| Error::Decode(format!("Handshake frame is not valid JSON: {}", e)))?;

        let code = frame
            .get("data")
            .and_then(|d| d.get("code"))
            .and_then(Value::as_i64)
            .unwrap_or(STATUS_OK);

        if code > STATUS_OK {
            let message = frame
                .get("data")
                .and_then(|d| d.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("handshake rejected")
                .to_string();
            return Ok(HandshakeOutcome::Rejected { code, message });
        }

        Ok(HandshakeOutcome::Accepted)
    }
}

/// Split a resolved response frame into its `data` object or a failure.
///
/// Success requires a `data` object whose `code` equals [`STATUS_OK`].
pub fn response_data(frame: Value) -> Result<Value> {
    let ok = frame
        .get("data")
        .and_then(|d| d.get("code"))
        .and_then(Value::as_i64)
        == Some(STATUS_OK);

    if !ok {
        let diagnostic = match frame.get("data") {
            Some(data) if !data.is_null() => data.clone(),
            _ => frame,
        };
        return Err(Error::RemoteCallFailed(diagnostic));
    }

    match frame {
        Value::Object(mut map) => map
            .remove("data")
            .ok_or_else(|| Error::Internal("response lost its data field".to_string())),
        _ => Err(Error::Internal("response frame is not an object".to_string())),
    }
}
