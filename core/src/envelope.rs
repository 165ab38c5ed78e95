//! The uniform event envelope carried by every inter-service message.
//!
//! # Wire form
//!
//! Envelopes travel as JSON:
//!
//! ```json
//! {
//!   "id": "<uuid>",
//!   "type": "assembly.completed",
//!   "source": "assembly-service",
//!   "subject": "<order_id>",
//!   "timestamp": "2024-01-01T00:00:00Z",
//!   "data": { ... }
//! }
//! ```
//!
//! `subject` is the partitioning key. It is stable across the whole lifecycle
//! of one order, which is what guarantees single-partition ordering per order.
//!
//! # Headers
//!
//! Every publish carries broker-level headers alongside the payload:
//! `event-type`, `event-id`, `event-source`, `producer-id`, `timestamp`,
//! `message-id`, `order-id` and `event-version`. On ingress the headers are
//! decoded into a lower-cased map; the routing triple (`event_type`,
//! `event_id`, `event_source`) is promoted to named fields and unknown
//! headers are preserved untouched.

use crate::error::FabricError;
use crate::events::EventType;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Header key for the dotted event type.
pub const HEADER_EVENT_TYPE: &str = "event-type";
/// Header key for the envelope id.
pub const HEADER_EVENT_ID: &str = "event-id";
/// Header key for the emitting service name.
pub const HEADER_EVENT_SOURCE: &str = "event-source";
/// Header key for the producer instance id.
pub const HEADER_PRODUCER_ID: &str = "producer-id";
/// Header key for the ISO-8601 UTC emission time.
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// Header key for the per-publish unique message id.
pub const HEADER_MESSAGE_ID: &str = "message-id";
/// Header key for the order the event is scoped to.
pub const HEADER_ORDER_ID: &str = "order-id";
/// Header key for the event schema version.
pub const HEADER_EVENT_VERSION: &str = "event-version";
/// Header key for the optional payload content type.
pub const HEADER_CONTENT_TYPE: &str = "content-type";

/// Current event schema version stamped on every publish.
pub const EVENT_VERSION: &str = "1.0";

/// Errors from envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload could not be serialized to JSON.
    #[error("failed to serialize envelope: {0}")]
    Serialization(String),

    /// Bytes are not a well-formed envelope, or `data` does not match the
    /// declared type. Fatal to the message; never retried.
    #[error("failed to decode envelope: {0}")]
    Decode(String),
}

impl From<EnvelopeError> for FabricError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Serialization(msg) => Self::Internal(msg),
            EnvelopeError::Decode(msg) => Self::Validation(msg),
        }
    }
}

/// The uniform message shell carrying a typed payload between services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique across the system.
    pub id: Uuid,

    /// Dotted event type, doubling as the topic name.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Emitting service name.
    pub source: String,

    /// Routing/partitioning key. The order id for order-scoped events.
    pub subject: String,

    /// UTC emission time.
    #[serde(rename = "timestamp")]
    pub time: DateTime<Utc>,

    /// Type-specific payload.
    pub data: Value,
}

impl EventEnvelope {
    /// Create an envelope with a fresh id and the current UTC time.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if `data` cannot be
    /// represented as JSON.
    pub fn new<T: Serialize>(
        event_type: EventType,
        source: impl Into<String>,
        subject: impl Into<String>,
        data: &T,
    ) -> Result<Self, EnvelopeError> {
        let data = serde_json::to_value(data)
            .map_err(|e| EnvelopeError::Serialization(e.to_string()))?;
        Ok(Self {
            id: Uuid::new_v4(),
            event_type,
            source: source.into(),
            subject: subject.into(),
            time: Utc::now(),
            data,
        })
    }

    /// Replace the auto-generated id (useful for tests and redelivery).
    #[must_use]
    pub const fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Replace the emission time.
    #[must_use]
    pub const fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Decode the `data` field into its typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] when `data` does not match the
    /// declared type. The failure is validation-class: the retry ladder
    /// will not re-attempt it.
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            EnvelopeError::Decode(format!(
                "malformed data for '{}': {e}",
                self.event_type
            ))
        })
    }

    /// Serialize to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] on JSON failure.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }

    /// Parse an envelope from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] when the bytes are not a
    /// well-formed envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))
    }

    /// Build the broker headers for publishing this envelope.
    ///
    /// A fresh `message-id` is drawn per call so redeliveries of the same
    /// envelope remain distinguishable at the transport layer.
    #[must_use]
    pub fn publish_headers(&self, producer_id: &str) -> Vec<(String, Vec<u8>)> {
        let mut headers = vec![
            (HEADER_EVENT_TYPE.to_string(), self.event_type.as_str().into()),
            (HEADER_EVENT_ID.to_string(), self.id.to_string().into_bytes()),
            (HEADER_EVENT_SOURCE.to_string(), self.source.clone().into_bytes()),
            (HEADER_PRODUCER_ID.to_string(), producer_id.as_bytes().to_vec()),
            (
                HEADER_TIMESTAMP.to_string(),
                self.time
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
                    .into_bytes(),
            ),
            (
                HEADER_MESSAGE_ID.to_string(),
                Uuid::new_v4().to_string().into_bytes(),
            ),
            (HEADER_EVENT_VERSION.to_string(), EVENT_VERSION.into()),
        ];
        if !self.subject.is_empty() {
            headers.push((HEADER_ORDER_ID.to_string(), self.subject.clone().into_bytes()));
        }
        headers
    }
}

/// A value destined for a broker message body.
///
/// Encoding rules: opaque bytes pass through, strings encode as UTF-8, and
/// everything else JSON-encodes.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Opaque bytes, passed through untouched.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Any other value, JSON-encoded.
    Json(Value),
}

impl Payload {
    /// Encode into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Serialization`] if a JSON value cannot be
    /// encoded.
    pub fn into_bytes(self) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Text(text) => Ok(text.into_bytes()),
            Self::Json(value) => serde_json::to_vec(&value)
                .map_err(|e| EnvelopeError::Serialization(e.to_string())),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Broker headers decoded on ingress.
///
/// Keys are lower-cased; the routing triple is promoted to named fields and
/// everything else is preserved in `rest`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedHeaders {
    /// Promoted `event-type` header, when present.
    pub event_type: Option<String>,
    /// Promoted `event-id` header, when present.
    pub event_id: Option<String>,
    /// Promoted `event-source` header, when present.
    pub event_source: Option<String>,
    /// All remaining headers, keys lower-cased, unknown keys preserved.
    pub rest: HashMap<String, String>,
}

impl DecodedHeaders {
    /// Decode raw header pairs.
    ///
    /// Non-UTF-8 header values are replaced lossily; headers are metadata and
    /// must never make a message undeliverable.
    #[must_use]
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let mut decoded = Self::default();
        for (key, value) in pairs {
            let key = key.to_lowercase();
            let value = String::from_utf8_lossy(value).into_owned();
            match key.as_str() {
                HEADER_EVENT_TYPE => decoded.event_type = Some(value),
                HEADER_EVENT_ID => decoded.event_id = Some(value),
                HEADER_EVENT_SOURCE => decoded.event_source = Some(value),
                _ => {
                    decoded.rest.insert(key, value);
                }
            }
        }
        decoded
    }
}
