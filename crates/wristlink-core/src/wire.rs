//! Wire representation of messages exchanged between the paired devices
//!
//! Messages are a string identifier plus a loosely typed, string-keyed content
//! map. Typed requests and responses are decoded from this representation
//! exactly once at the boundary (see `messages`), using `ContentReader` to
//! turn missing or mistyped keys into `DecodeError`s.

use alloc::collections::BTreeMap;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DecodeError, Result};

// ----------------------------------------------------------------------------
// Values
// ----------------------------------------------------------------------------

/// Content map carried by every message
pub type Content = BTreeMap<String, Value>;

/// Loosely typed value inside a message content map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Data(Vec<u8>),
    List(Vec<Value>),
    Map(Content),
    Null,
}

impl Value {
    /// Convert to JSON; binary data becomes a base64 string
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Data(bytes) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => content_to_json(map),
            Value::Null => serde_json::Value::Null,
        }
    }

    /// Convert from JSON. `None` only for numbers that fit neither `i64` nor
    /// `f64`; a nested failure fails the whole value.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        Some(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64()?),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect::<Option<Content>>()?,
            ),
        })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Data(value)
    }
}

/// Convert a whole content map to a JSON object
pub fn content_to_json(content: &Content) -> serde_json::Value {
    serde_json::Value::Object(
        content
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// Delivery semantics of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Delivered without a reply
    FireAndForget,
    /// Immediate message expecting exactly one reply
    Request,
    /// Binary payload sent over the store-and-forward channel
    Blob,
}

/// A named, directed unit of communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub identifier: String,
    pub content: Content,
    pub kind: MessageKind,
}

impl WireMessage {
    /// Create a message with empty content
    pub fn new(identifier: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            identifier: identifier.into(),
            content: Content::new(),
            kind,
        }
    }

    /// Create a request-with-reply message
    pub fn request(identifier: impl Into<String>) -> Self {
        Self::new(identifier, MessageKind::Request)
    }

    /// Create a fire-and-forget message
    pub fn notification(identifier: impl Into<String>) -> Self {
        Self::new(identifier, MessageKind::FireAndForget)
    }

    /// Builder-style content insertion
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    /// Typed reader over this message's content
    pub fn reader(&self) -> ContentReader<'_> {
        ContentReader::new(&self.identifier, &self.content)
    }
}

/// A binary payload sent via blob transfer, routed by its metadata identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: Uuid,
    pub metadata: WireMessage,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(identifier: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            metadata: WireMessage::new(identifier, MessageKind::Blob),
            data,
        }
    }
}

// ----------------------------------------------------------------------------
// Frame Codec
// ----------------------------------------------------------------------------

/// Serialize a message for byte-oriented transports
pub fn encode_frame(message: &WireMessage) -> Result<Vec<u8>> {
    Ok(bincode::serialize(message)?)
}

/// Deserialize a message produced by `encode_frame`
pub fn decode_frame(bytes: &[u8]) -> Result<WireMessage> {
    Ok(bincode::deserialize(bytes)?)
}

// ----------------------------------------------------------------------------
// Content Reader
// ----------------------------------------------------------------------------

/// Typed access to a content map, producing `DecodeError`s on mismatch
#[derive(Debug, Clone, Copy)]
pub struct ContentReader<'a> {
    identifier: &'a str,
    content: &'a Content,
}

impl<'a> ContentReader<'a> {
    pub fn new(identifier: &'a str, content: &'a Content) -> Self {
        Self {
            identifier,
            content,
        }
    }

    fn get(&self, key: &str) -> core::result::Result<&'a Value, DecodeError> {
        self.content
            .get(key)
            .ok_or_else(|| DecodeError::missing(self.identifier, key))
    }

    fn mismatch(&self, key: &str, expected: &'static str) -> DecodeError {
        DecodeError::wrong_type(self.identifier, key, expected)
    }

    pub fn string(&self, key: &str) -> core::result::Result<&'a str, DecodeError> {
        match self.get(key)? {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch(key, "string")),
        }
    }

    pub fn optional_string(&self, key: &str) -> core::result::Result<Option<&'a str>, DecodeError> {
        match self.content.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.mismatch(key, "string")),
        }
    }

    pub fn int(&self, key: &str) -> core::result::Result<i64, DecodeError> {
        match self.get(key)? {
            Value::Int(i) => Ok(*i),
            _ => Err(self.mismatch(key, "integer")),
        }
    }

    /// Non-negative integer that fits in `u32`
    pub fn u32(&self, key: &str) -> core::result::Result<u32, DecodeError> {
        let value = self.int(key)?;
        u32::try_from(value).map_err(|_| {
            DecodeError::invalid(self.identifier, key, format!("{} out of range", value))
        })
    }

    pub fn optional_u32(&self, key: &str) -> core::result::Result<Option<u32>, DecodeError> {
        if self.content.contains_key(key) {
            self.u32(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn bool(&self, key: &str) -> core::result::Result<bool, DecodeError> {
        match self.get(key)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(self.mismatch(key, "bool")),
        }
    }

    pub fn data(&self, key: &str) -> core::result::Result<&'a [u8], DecodeError> {
        match self.get(key)? {
            Value::Data(bytes) => Ok(bytes),
            _ => Err(self.mismatch(key, "data")),
        }
    }

    pub fn list(&self, key: &str) -> core::result::Result<&'a [Value], DecodeError> {
        match self.get(key)? {
            Value::List(items) => Ok(items),
            _ => Err(self.mismatch(key, "list")),
        }
    }

    pub fn map(&self, key: &str) -> core::result::Result<&'a Content, DecodeError> {
        match self.get(key)? {
            Value::Map(map) => Ok(map),
            _ => Err(self.mismatch(key, "map")),
        }
    }

    /// Decode a nested map into a serde type via its JSON form
    pub fn decode_map<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> core::result::Result<T, DecodeError> {
        let map = self.map(key)?;
        serde_json::from_value(content_to_json(map))
            .map_err(|e| DecodeError::invalid(self.identifier, key, e.to_string()))
    }
}
