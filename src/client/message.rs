//! Message definitions
//!
//! `Message` is the JSON object carried by `produce` and `data`. Notes on
//! fields:
//! - `headers.from` / `headers.to`: destinations; the service routes on `to`
//! - `headers.signature`: RSA-SHA256 over `content`, externally managed mode
//!   only. Sent as a Node `Buffer` JSON object; base64 strings and byte
//!   arrays are accepted on input
//! - `content`: the application payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::{ClientError, Result};

pub type Destination = String;
pub type DeliveryKey = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    pub from: Destination,
    pub to: Destination,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "signature_bytes"
    )]
    pub signature: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub headers: Headers,
    pub content: String,
}

impl Message {
    pub fn new(
        from: impl Into<Destination>,
        to: impl Into<Destination>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            headers: Headers {
                from: from.into(),
                to: to.into(),
                signature: None,
            },
            content: content.into(),
        }
    }
}

/// Confirmation that the service accepted a published message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    #[serde(deserialize_with = "delivery_key")]
    pub key: DeliveryKey,
    pub timestamp: i64,
}

/// Outcome of checking `headers.signature` on a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Verified,
    Invalid,
    /// The message carried no signature.
    Unsigned,
    /// Signed, but no counterparty certificate was available to check it.
    Unchecked,
}

/// A received message together with its service metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message: Message,
    pub key: DeliveryKey,
    pub timestamp: i64,
    pub signature: SignatureStatus,
}

impl Delivery {
    /// The content, unless its signature failed verification.
    pub fn verified_content(&self) -> Result<&str> {
        match self.signature {
            SignatureStatus::Invalid => Err(ClientError::VerifyFailure {
                key: self.key.clone(),
            }),
            _ => Ok(&self.message.content),
        }
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Everything a `Connection` reports outside of a specific call.
#[derive(Debug)]
pub enum Event {
    Connected,
    Message(Delivery),
    DeliveryReport(DeliveryReport),
    Disconnected,
    /// The service emitted `exception`.
    Exception(String),
    Error(ClientError),
    ConnectError(ClientError),
}

/// Bytes as they show up in JSON after passing through the service: a
/// string, a Node `Buffer` object or a plain array.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireBytes {
    Text(String),
    Buffer {
        #[serde(rename = "type")]
        _kind: String,
        data: Vec<u8>,
    },
    Raw(Vec<u8>),
}

impl WireBytes {
    fn into_text(self) -> String {
        match self {
            WireBytes::Text(text) => text,
            WireBytes::Buffer { data, .. } | WireBytes::Raw(data) => {
                String::from_utf8_lossy(&data).into_owned()
            }
        }
    }
}

fn delivery_key<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<DeliveryKey, D::Error> {
    WireBytes::deserialize(deserializer).map(WireBytes::into_text)
}

/// Reads the key of a `data` event. Byte keys are decoded as UTF-8; `null`
/// or a missing key is empty.
pub(crate) fn key_from_value(value: Option<&Value>) -> DeliveryKey {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(other) => WireBytes::deserialize(other)
            .map(WireBytes::into_text)
            .unwrap_or_else(|_| other.to_string()),
    }
}

mod signature_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::ser::SerializeStruct;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::WireBytes;

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                let mut buffer = serializer.serialize_struct("Buffer", 2)?;
                buffer.serialize_field("type", "Buffer")?;
                buffer.serialize_field("data", bytes)?;
                buffer.end()
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<WireBytes>::deserialize(deserializer)? {
            None => Ok(None),
            Some(WireBytes::Text(text)) => STANDARD
                .decode(text.as_bytes())
                .map(Some)
                .map_err(|e| D::Error::custom(format!("signature is not base64: {e}"))),
            Some(WireBytes::Buffer { data, .. }) | Some(WireBytes::Raw(data)) => Ok(Some(data)),
        }
    }
}
