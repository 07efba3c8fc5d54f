//! Pusher-compatible relay frames shared by the hosted relay client and the local socket server.
//!
//! Every frame is a JSON object with an `event` name, an optional `channel` and a `data`
//! field. Server-originated `data` is a JSON-encoded string; clients may send objects.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const SUBSCRIBE: &str = "pusher:subscribe";
pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
pub const PING: &str = "pusher:ping";
pub const PONG: &str = "pusher:pong";
pub const ERROR: &str = "pusher:error";
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
/// Prefix reserved for events that clients may trigger themselves.
pub const CLIENT_EVENT_PREFIX: &str = "client-";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed relay frame")]
    Malformed(#[from] serde_json::Error),
    #[error("relay frame `{event}` is missing its channel")]
    MissingChannel { event: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decoded relay frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    ConnectionEstablished { socket_id: String, activity_timeout: u64 },
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    SubscriptionSucceeded { channel: String },
    Ping,
    Pong,
    Error { message: String, code: Option<u32> },
    /// Application event on a channel.
    Event {
        channel: String,
        event: String,
        data: Value,
    },
}

/// Accept `data` either as a JSON-encoded string or as an inline value.
fn unwrap_data(data: Value) -> Value {
    match data {
        Value::String(encoded) => serde_json::from_str(&encoded).unwrap_or(Value::String(encoded)),
        other => other,
    }
}

fn channel_of(raw: &RawFrame) -> Result<String, ProtocolError> {
    raw.channel
        .clone()
        .or_else(|| {
            raw.data
                .get("channel")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| ProtocolError::MissingChannel {
            event: raw.event.clone(),
        })
}

impl RelayMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut raw: RawFrame = serde_json::from_str(text)?;
        raw.data = unwrap_data(std::mem::take(&mut raw.data));

        Ok(match raw.event.as_str() {
            CONNECTION_ESTABLISHED => RelayMessage::ConnectionEstablished {
                socket_id: raw
                    .data
                    .get("socket_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                activity_timeout: raw
                    .data
                    .get("activity_timeout")
                    .and_then(Value::as_u64)
                    .unwrap_or(120),
            },
            SUBSCRIBE => RelayMessage::Subscribe {
                channel: channel_of(&raw)?,
            },
            UNSUBSCRIBE => RelayMessage::Unsubscribe {
                channel: channel_of(&raw)?,
            },
            SUBSCRIPTION_SUCCEEDED => RelayMessage::SubscriptionSucceeded {
                channel: channel_of(&raw)?,
            },
            PING => RelayMessage::Ping,
            PONG => RelayMessage::Pong,
            ERROR => RelayMessage::Error {
                message: raw
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
                code: raw
                    .data
                    .get("code")
                    .and_then(Value::as_u64)
                    .and_then(|code| u32::try_from(code).ok()),
            },
            _ => RelayMessage::Event {
                channel: channel_of(&raw)?,
                event: raw.event,
                data: raw.data,
            },
        })
    }

    pub fn encode(&self) -> String {
        let raw = match self {
            RelayMessage::ConnectionEstablished {
                socket_id,
                activity_timeout,
            } => RawFrame {
                event: CONNECTION_ESTABLISHED.into(),
                channel: None,
                data: encoded(&json!({
                    "socket_id": socket_id,
                    "activity_timeout": activity_timeout,
                })),
            },
            RelayMessage::Subscribe { channel } => RawFrame {
                event: SUBSCRIBE.into(),
                channel: None,
                data: json!({ "channel": channel }),
            },
            RelayMessage::Unsubscribe { channel } => RawFrame {
                event: UNSUBSCRIBE.into(),
                channel: None,
                data: json!({ "channel": channel }),
            },
            RelayMessage::SubscriptionSucceeded { channel } => RawFrame {
                event: SUBSCRIPTION_SUCCEEDED.into(),
                channel: Some(channel.clone()),
                data: encoded(&json!({})),
            },
            RelayMessage::Ping => RawFrame {
                event: PING.into(),
                channel: None,
                data: json!({}),
            },
            RelayMessage::Pong => RawFrame {
                event: PONG.into(),
                channel: None,
                data: json!({}),
            },
            RelayMessage::Error { message, code } => RawFrame {
                event: ERROR.into(),
                channel: None,
                data: json!({ "message": message, "code": code }),
            },
            RelayMessage::Event {
                channel,
                event,
                data,
            } => RawFrame {
                event: event.clone(),
                channel: Some(channel.clone()),
                data: encoded(data),
            },
        };
        serde_json::to_string(&raw).unwrap_or_default()
    }
}

fn encoded(data: &Value) -> Value {
    Value::String(data.to_string())
}

/// Whether a client may trigger `event` directly.
pub fn is_client_event(event: &str) -> bool {
    event.starts_with(CLIENT_EVENT_PREFIX) && event.len() > CLIENT_EVENT_PREFIX.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_string_encoded_data() {
        let frame = RelayMessage::Event {
            channel: "match-42".into(),
            event: "score-update".into(),
            data: json!({"teamId": "t1", "points": 3}),
        }
        .encode();

        let raw: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(raw["channel"], json!("match-42"));
        assert!(raw["data"].is_string());

        assert_eq!(
            RelayMessage::decode(&frame).unwrap(),
            RelayMessage::Event {
                channel: "match-42".into(),
                event: "score-update".into(),
                data: json!({"teamId": "t1", "points": 3}),
            }
        );
    }

    #[test]
    fn subscribe_accepts_inline_client_data() {
        let message =
            RelayMessage::decode(r#"{"event":"pusher:subscribe","data":{"channel":"global"}}"#)
                .unwrap();
        assert_eq!(
            message,
            RelayMessage::Subscribe {
                channel: "global".into()
            }
        );
    }

    #[test]
    fn application_events_need_a_channel() {
        assert!(matches!(
            RelayMessage::decode(r#"{"event":"score-update","data":"{}"}"#),
            Err(ProtocolError::MissingChannel { .. })
        ));
        assert!(RelayMessage::decode("not json").is_err());
    }

    #[test]
    fn client_events_need_the_prefix_and_a_name() {
        assert!(is_client_event("client-typing"));
        assert!(!is_client_event("client-"));
        assert!(!is_client_event("score-update"));
    }
}
