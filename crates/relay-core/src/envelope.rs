//! Wire formats for both dispatcher modes.
//!
//! Topic mode exchanges [`MessageEnvelope`] JSON objects. Command mode sends
//! bare `{"<eventType>": value}` objects and `{"error": {...}}` frames built
//! by [`frames`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope kind. A missing `type` field means [`EnvelopeType::Publish`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeType {
    /// Add a topic pattern to the stream.
    Subscribe,
    /// Remove a topic pattern from the stream.
    Unsubscribe,
    /// Data (or an error) for a topic.
    #[default]
    Publish,
    /// Retraction of previously published data.
    Unpublish,
    /// Server acknowledgement of a recorded subscribe.
    SubscribeAck,
}

/// Error payload carried inside an envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    /// HTTP-like status code (400 for validation failures).
    pub code: u16,
    /// Description.
    pub desc: String,
}

impl EnvelopeError {
    /// Build an error payload.
    #[must_use]
    pub fn new(code: u16, desc: impl Into<String>) -> Self {
        Self {
            code,
            desc: desc.into(),
        }
    }

    /// A 400 validation error.
    #[must_use]
    pub fn bad_request(desc: impl Into<String>) -> Self {
        Self::new(400, desc)
    }
}

/// Topic-mode message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Kind; `None` on the wire is read as publish.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EnvelopeType>,
    /// Topic (a pattern for subscribe/unsubscribe).
    #[serde(default)]
    pub topic: String,
    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

impl MessageEnvelope {
    fn with_kind(kind: EnvelopeType, topic: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            topic: topic.into(),
            data: None,
            error: None,
        }
    }

    /// Subscribe request for `topic`.
    #[must_use]
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::with_kind(EnvelopeType::Subscribe, topic)
    }

    /// Unsubscribe request for `topic`.
    #[must_use]
    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self::with_kind(EnvelopeType::Unsubscribe, topic)
    }

    /// Publish `data` on `topic`.
    #[must_use]
    pub fn publish(topic: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::with_kind(EnvelopeType::Publish, topic)
        }
    }

    /// Publish an error on `topic`.
    #[must_use]
    pub fn error(topic: impl Into<String>, error: EnvelopeError) -> Self {
        Self {
            error: Some(error),
            ..Self::with_kind(EnvelopeType::Publish, topic)
        }
    }

    /// Retract data on `topic`.
    #[must_use]
    pub fn unpublish(topic: impl Into<String>) -> Self {
        Self::with_kind(EnvelopeType::Unpublish, topic)
    }

    /// Acknowledge a subscribe to `topic`.
    #[must_use]
    pub fn subscribe_ack(topic: impl Into<String>) -> Self {
        Self::with_kind(EnvelopeType::SubscribeAck, topic)
    }

    /// Effective kind, defaulting to publish.
    pub fn kind(&self) -> EnvelopeType {
        self.kind.unwrap_or_default()
    }

    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Command-mode frames.
pub mod frames {
    use serde::Serialize;
    use serde_json::{Map, Value};

    #[derive(Serialize)]
    struct ErrorBody<'a> {
        message: &'a str,
        key: &'a str,
    }

    #[derive(Serialize)]
    struct ErrorFrame<'a> {
        error: ErrorBody<'a>,
    }

    /// `{"<event_type>": value}`.
    pub fn data(event_type: &str, value: Value) -> serde_json::Result<String> {
        let mut map = Map::with_capacity(1);
        let _ = map.insert(event_type.to_owned(), value);
        serde_json::to_string(&map)
    }

    /// `{"error": {"message": .., "key": ..}}`.
    pub fn error(message: &str, key: &str) -> serde_json::Result<String> {
        serde_json::to_string(&ErrorFrame {
            error: ErrorBody { message, key },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_type_is_publish() {
        let env = MessageEnvelope::parse(r#"{"topic":"a/b","data":1}"#).unwrap();
        assert_eq!(env.kind, None);
        assert_eq!(env.kind(), EnvelopeType::Publish);
        assert_eq!(env.data, Some(json!(1)));
    }

    #[test]
    fn parses_camel_case_types() {
        let env = MessageEnvelope::parse(r#"{"type":"subscribeAck","topic":"x"}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeType::SubscribeAck);
        let env = MessageEnvelope::parse(r#"{"type":"unsubscribe","topic":"x"}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeType::Unsubscribe);
    }

    #[test]
    fn missing_topic_defaults_to_empty() {
        let env = MessageEnvelope::parse(r#"{"type":"subscribe"}"#).unwrap();
        assert_eq!(env.topic, "");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(MessageEnvelope::parse(r#"{"type":"bogus","topic":"x"}"#).is_err());
    }

    #[test]
    fn error_envelope_wire_shape() {
        let env = MessageEnvelope::error("a/+", EnvelopeError::bad_request("Invalid topic"));
        let value: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "publish", "topic": "a/+", "error": {"code": 400, "desc": "Invalid topic"}})
        );
    }

    #[test]
    fn subscribe_omits_empty_fields() {
        let value: Value =
            serde_json::from_str(&MessageEnvelope::subscribe("x/#").to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "subscribe", "topic": "x/#"}));
    }

    #[test]
    fn data_frame_keys_by_event_type() {
        let frame = frames::data("price", json!({"bid": 1.5})).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"price": {"bid": 1.5}}));
    }

    #[test]
    fn error_frame_shape() {
        let frame = frames::error("Invalid event type", "unknownType").unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"error": {"message": "Invalid event type", "key": "unknownType"}})
        );
    }
}
