use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HostError;

/// Correlation number assigned to every message crossing the boundary.
pub type Seq = u64;

/// Ordered string parameters of a message, the query part of an IPC URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::insert`].
    pub fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Parses a parameter, returning `None` when it is missing or malformed.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{}={}", urlencoding::encode(k), urlencoding::encode(v))?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// One outbound request: `ipc://<command>?<params>` plus an optional body.
#[derive(Debug, Clone)]
pub struct Message {
    pub seq: Seq,
    pub command: String,
    pub params: Params,
    pub bytes: Option<Bytes>,
}

impl Message {
    pub fn new(seq: Seq, command: impl Into<String>, params: Params) -> Self {
        Self {
            seq,
            command: command.into(),
            params,
            bytes: None,
        }
    }

    pub fn with_bytes(mut self, bytes: Bytes) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipc://{}?seq={}", self.command, self.seq)?;
        if !self.params.is_empty() {
            write!(f, "&{}", self.params)?;
        }
        Ok(())
    }
}

/// The successful value of a round-trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary(Bytes),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Json(Value::Object(Default::default()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Binary(b) => Some(b),
            Payload::Json(_) => None,
        }
    }

    /// Field of a JSON object payload.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.as_json().and_then(|v| v.get(key))
    }

    /// Field of a JSON object payload read as a string, numbers included.
    pub fn field_str(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// `null`, `{}` and zero-length binary bodies carry nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Json(Value::Null) => true,
            Payload::Json(Value::Object(o)) => o.is_empty(),
            Payload::Json(_) => false,
            Payload::Binary(b) => b.is_empty(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

/// What the host sends back for a [`Message`] with the same `seq`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub seq: Seq,
    pub result: Result<Payload, HostError>,
    pub headers: HeaderMap,
}

impl Reply {
    pub fn ok(seq: Seq, payload: impl Into<Payload>) -> Self {
        Self {
            seq,
            result: Ok(payload.into()),
            headers: HeaderMap::new(),
        }
    }

    pub fn err(seq: Seq, err: HostError) -> Self {
        Self {
            seq,
            result: Err(err),
            headers: HeaderMap::new(),
        }
    }

    /// Binary replies are tagged as octet streams unless a handler chose
    /// another content type.
    pub(crate) fn normalize(mut self) -> Self {
        if matches!(self.result, Ok(Payload::Binary(_))) && !self.headers.contains_key(CONTENT_TYPE)
        {
            self.headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_render_as_query() {
        let params = Params::new().set("path", "/tmp/a b.txt").set("id", 42u64);
        assert_eq!(params.to_string(), "id=42&path=%2Ftmp%2Fa%20b.txt");
        assert_eq!(params.parse::<u64>("id"), Some(42));
        assert_eq!(params.parse::<u64>("path"), None);
        assert_eq!(params.get_or("flags", "r"), "r");
    }

    #[test]
    fn message_display() {
        let msg = Message::new(3, "fs.close", Params::new().set("id", "9"));
        assert_eq!(msg.to_string(), "ipc://fs.close?seq=3&id=9");
    }

    #[test]
    fn payload_fields() {
        let payload = Payload::from(json!({ "id": "1", "fd": 7 }));
        assert_eq!(payload.field_str("fd").as_deref(), Some("7"));
        assert_eq!(payload.field_str("id").as_deref(), Some("1"));
        assert!(!payload.is_empty());
        assert!(Payload::empty().is_empty());
        assert!(Payload::Binary(Bytes::new()).is_empty());
    }

    #[test]
    fn binary_reply_gets_octet_stream() {
        let reply = Reply::ok(1, Bytes::from_static(b"hi")).normalize();
        assert_eq!(
            reply.headers.get(CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
    }
}
