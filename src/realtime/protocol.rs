//! # Wire Protocol
//!
//! JSON text frames exchanged with the real-time gateway.
//!
//! Client frames: `{"type":"subscribe","channel":..}` and
//! `{"type":"unsubscribe","channel":..}`. Server acks:
//! `{"type":"subscribed","channel":..}` / `{"type":"unsubscribed",..}`.
//! Data frames carry the channel name in their `type` field:
//! `{"type":<channel>,"channel":..,"data":..,"timestamp":..}`.
//!
//! Bare `"ping"`/`"pong"` text is a valid non-JSON heartbeat exchange; any
//! other frame that does not parse as JSON is ignored by the demux layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Heartbeat request text
pub const PING: &str = "ping";
/// Heartbeat reply text
pub const PONG: &str = "pong";

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientFrame {
    /// Channel this frame refers to
    pub fn channel(&self) -> &str {
        match self {
            Self::Subscribe { channel } | Self::Unsubscribe { channel } => channel,
        }
    }

    /// Serialize to the wire text representation
    pub fn to_text(&self) -> String {
        // Both variants serialize infallibly: plain strings only.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Subscription acknowledged
    Subscribed { channel: String },
    /// Unsubscription acknowledged
    Unsubscribed { channel: String },
    /// Channel data frame
    Data {
        channel: String,
        data: Value,
        timestamp: Option<String>,
    },
    /// Heartbeat reply (bare `"pong"` text)
    Pong,
    /// Heartbeat request (bare `"ping"` text)
    Ping,
}

impl ServerFrame {
    /// Parse a text frame. Returns `None` for anything that is neither a
    /// heartbeat nor well-formed JSON with the expected fields; such frames
    /// are ignored upstream.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            PING => return Some(Self::Ping),
            PONG => return Some(Self::Pong),
            _ => {}
        }

        let value: Value = serde_json::from_str(text).ok()?;
        let frame_type = value.get("type")?.as_str()?.to_string();
        let channel = value.get("channel").and_then(Value::as_str);

        match frame_type.as_str() {
            "subscribed" => Some(Self::Subscribed {
                channel: channel?.to_string(),
            }),
            "unsubscribed" => Some(Self::Unsubscribed {
                channel: channel?.to_string(),
            }),
            _ => {
                // Data frames name their channel in `type`; the explicit
                // `channel` field wins when both are present.
                let channel = channel.unwrap_or(&frame_type).to_string();
                Some(Self::Data {
                    channel,
                    data: value.get("data").cloned().unwrap_or(Value::Null),
                    timestamp: value
                        .get("timestamp")
                        .and_then(Value::as_str)
                        .map(String::from),
                })
            }
        }
    }
}
