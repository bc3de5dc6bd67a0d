//! The generic, newline-delimited JSON frame carried over a multiplexed
//! connection. Known control frames (`ping`/`pong`) decode into concrete
//! variants; everything else decodes into [`MuxFrame::Raw`] so higher
//! layers (the mesh participant, a file-chunk transfer extension, ...) can
//! introduce new `type` values without touching this crate.

use crate::error::MuxError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum MuxFrame {
    Ping { timestamp: u64 },
    Pong { node_id: String, timestamp: u64 },
    Raw { r#type: String, payload: Value },
}

impl MuxFrame {
    pub fn frame_type(&self) -> &str {
        match self {
            MuxFrame::Ping { .. } => "ping",
            MuxFrame::Pong { .. } => "pong",
            MuxFrame::Raw { r#type, .. } => r#type,
        }
    }

    /// Heartbeat frames, and any frame whose payload carries a truthy
    /// `bypassDedup` field, are never suppressed by the dedup window.
    pub fn bypasses_dedup(&self) -> bool {
        match self {
            MuxFrame::Ping { .. } | MuxFrame::Pong { .. } => true,
            MuxFrame::Raw { payload, .. } => payload
                .get("bypassDedup")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    pub fn ping(timestamp: u64) -> Self {
        MuxFrame::Ping { timestamp }
    }

    pub fn pong(node_id: impl Into<String>, timestamp: u64) -> Self {
        MuxFrame::Pong {
            node_id: node_id.into(),
            timestamp,
        }
    }

    /// Parse one decoded JSON line. The line must decode to a JSON object
    /// carrying a string `type` field; anything else is a protocol error
    /// and the caller should drop the line per the framing contract.
    pub fn parse(line: &[u8]) -> Result<Self, MuxError> {
        let value: Value = serde_json::from_slice(line).map_err(|_| MuxError::MissingType)?;
        let type_str = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MuxError::MissingType)?
            .to_string();
        match type_str.as_str() {
            "ping" => {
                let wire: PingWireIn = serde_json::from_value(value).map_err(|_| MuxError::MissingType)?;
                Ok(MuxFrame::Ping { timestamp: wire.timestamp })
            }
            "pong" => {
                let wire: PongWireIn = serde_json::from_value(value).map_err(|_| MuxError::MissingType)?;
                Ok(MuxFrame::Pong {
                    node_id: wire.node_id,
                    timestamp: wire.timestamp,
                })
            }
            _ => Ok(MuxFrame::Raw { r#type: type_str, payload: value }),
        }
    }

    /// Serialize to a single JSON line, without a trailing newline (the
    /// writer appends it).
    pub fn to_line(&self) -> String {
        match self {
            MuxFrame::Ping { timestamp } => {
                serde_json::to_string(&PingWireOut { r#type: "ping", timestamp: *timestamp }).expect("serializable")
            }
            MuxFrame::Pong { node_id, timestamp } => serde_json::to_string(&PongWireOut {
                r#type: "pong",
                node_id,
                timestamp: *timestamp,
            })
            .expect("serializable"),
            MuxFrame::Raw { payload, .. } => serde_json::to_string(payload).expect("serializable"),
        }
    }
}

#[derive(Deserialize)]
struct PingWireIn {
    timestamp: u64,
}

#[derive(Deserialize)]
struct PongWireIn {
    #[serde(rename = "nodeId")]
    node_id: String,
    timestamp: u64,
}

#[derive(Serialize)]
struct PingWireOut<'a> {
    r#type: &'a str,
    timestamp: u64,
}

#[derive(Serialize)]
struct PongWireOut<'a> {
    r#type: &'a str,
    #[serde(rename = "nodeId")]
    node_id: &'a str,
    timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_decodes_as_raw() {
        let line = br#"{"type":"custom-thing","foo":"bar"}"#;
        let frame = MuxFrame::parse(line).unwrap();
        match frame {
            MuxFrame::Raw { r#type, payload } => {
                assert_eq!(r#type, "custom-thing");
                assert_eq!(payload["foo"], "bar");
            }
            _ => panic!("expected Raw"),
        }
    }

    #[test]
    fn missing_type_is_rejected() {
        let line = br#"{"foo":"bar"}"#;
        assert!(MuxFrame::parse(line).is_err());
    }

    #[test]
    fn ping_and_pong_always_bypass_dedup() {
        assert!(MuxFrame::ping(1).bypasses_dedup());
        assert!(MuxFrame::pong("abc", 1).bypasses_dedup());
    }

    #[test]
    fn raw_frame_honors_bypass_dedup_flag() {
        let tagged = MuxFrame::parse(br#"{"type":"x","bypassDedup":true}"#).unwrap();
        assert!(tagged.bypasses_dedup());
        let untagged = MuxFrame::parse(br#"{"type":"x"}"#).unwrap();
        assert!(!untagged.bypasses_dedup());
    }

    #[test]
    fn pong_round_trips_through_the_wire_format() {
        let frame = MuxFrame::pong("deadbeef", 42);
        let line = frame.to_line();
        let parsed = MuxFrame::parse(line.as_bytes()).unwrap();
        assert_eq!(frame, parsed);
    }
}
