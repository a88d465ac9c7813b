//! Envelope model and JSON text codec for the topic channel.
//!
//! This crate owns the wire representation shared by the runtime and any
//! peer tooling. Every frame is a two-field JSON object, `{"t": topic, "d":
//! payload}`, carried as a websocket text message. Payloads stay flexible
//! (`serde_json::Value`); an absent `d` and an explicit `null` are kept apart.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// =============================================================================
// RESERVED TOPICS
// =============================================================================

/// Subscription-only marker matching every topic. Never sent.
pub const WILDCARD: &str = "*";

/// Server → client error report.
pub const TOPIC_ERROR: &str = "error";

/// Client → server module request, payload [`ModuleRequest`].
pub const TOPIC_MODULE: &str = "module";

/// Prefix of server → client module source delivery (`module:<name>`).
pub const MODULE_PREFIX: &str = "module:";

/// Latency probe sent by the client, payload = millisecond timestamp.
pub const TOPIC_PING: &str = "ping";

/// Latency probe answer from the server.
pub const TOPIC_PONG: &str = "pong";

/// Client → server diagnostic/log report.
pub const TOPIC_REPORT: &str = "r";

/// Client → server internal-error report, payload = trace text.
pub const TOPIC_FAULT: &str = "e";

/// Error returned by [`encode`] and [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON or does not have the envelope shape.
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
    /// The `t` field is absent or empty.
    #[error("envelope has no topic")]
    MissingTopic,
    /// The wildcard marker was used as an outbound topic.
    #[error("topic `*` is subscription-only and cannot be sent")]
    Wildcard,
}

/// A single message on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// Routing label, never empty.
    pub topic: String,
    /// `None` when the frame carried no `d` field.
    pub payload: Option<Value>,
}

impl Envelope {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Option<Value>) -> Self {
        Self { topic: topic.into(), payload }
    }

    /// Classify this envelope's topic.
    #[must_use]
    pub fn kind(&self) -> Topic<'_> {
        Topic::classify(&self.topic)
    }
}

/// Reserved-topic view of a topic string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic<'a> {
    Error,
    /// `module:<name>`, carrying the module name.
    ModuleResponse(&'a str),
    ModuleRequest,
    Ping,
    Pong,
    Report,
    Fault,
    Other(&'a str),
}

impl<'a> Topic<'a> {
    #[must_use]
    pub fn classify(topic: &'a str) -> Self {
        if let Some(name) = topic.strip_prefix(MODULE_PREFIX) {
            return Self::ModuleResponse(name);
        }
        match topic {
            TOPIC_ERROR => Self::Error,
            TOPIC_MODULE => Self::ModuleRequest,
            TOPIC_PING => Self::Ping,
            TOPIC_PONG => Self::Pong,
            TOPIC_REPORT => Self::Report,
            TOPIC_FAULT => Self::Fault,
            other => Self::Other(other),
        }
    }
}

/// Topic on which the server delivers the source of module `name`.
#[must_use]
pub fn module_topic(name: &str) -> String {
    format!("{MODULE_PREFIX}{name}")
}

/// Payload of a [`TOPIC_MODULE`] request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Encode a topic and payload into a text frame.
///
/// # Errors
///
/// Returns [`CodecError::MissingTopic`] for an empty topic and
/// [`CodecError::Wildcard`] for `*`.
pub fn encode(topic: &str, payload: Option<&Value>) -> Result<String, CodecError> {
    if topic.is_empty() {
        return Err(CodecError::MissingTopic);
    }
    if topic == WILDCARD {
        return Err(CodecError::Wildcard);
    }
    let wire = WireOut { t: topic, d: payload };
    Ok(serde_json::to_string(&wire)?)
}

/// Encode an [`Envelope`] into a text frame.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_envelope(envelope: &Envelope) -> Result<String, CodecError> {
    encode(&envelope.topic, envelope.payload.as_ref())
}

/// Decode a text frame into an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for text that is not an envelope object and
/// [`CodecError::MissingTopic`] when `t` is absent or empty.
pub fn decode(frame: &str) -> Result<Envelope, CodecError> {
    let wire: WireIn = serde_json::from_str(frame)?;
    match wire.t {
        Some(topic) if !topic.is_empty() => Ok(Envelope { topic, payload: wire.d }),
        _ => Err(CodecError::MissingTopic),
    }
}

#[derive(Serialize)]
struct WireOut<'a> {
    t: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    d: Option<&'a Value>,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(default)]
    t: Option<String>,
    #[serde(default, deserialize_with = "present")]
    d: Option<Value>,
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing field is `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
