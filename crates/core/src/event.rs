//! HTTP transaction events emitted by the network sensor.
//!
//! The sensor prints one JSON object per observed transaction:
//!
//! ```json
//! {
//!   "request":  { "header": { "request-line": "GET / HTTP/1.1", "Host": "example.com" }, "body": "" },
//!   "response": { "header": { "response-line": "HTTP/1.1 200 OK" }, "body": "ok" },
//!   "metadata": { "src_ip": "10.0.0.5", "src_port": 51514, "dest_ip": "10.0.0.9",
//!                 "dest_port": 443, "timestamp": "2024-05-01T12:00:00Z" }
//! }
//! ```
//!
//! Missing sections deserialize to empty defaults. Whether an event carries
//! enough information to be exported is decided by the filter stage, not here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One HTTP request/response pair observed on the wire.
///
/// Moved through the pipeline queues, never cloned on the hot path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEvent {
    pub request: HttpMessage,
    pub response: HttpMessage,
    pub metadata: FlowMetadata,
}

impl HttpEvent {
    /// Parses a single sensor output line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// `request-line` header, e.g. `GET /index.html HTTP/1.1`.
    pub fn request_line(&self) -> Option<&str> {
        self.request.header.get(HeaderKey::RequestLine)
    }

    /// `response-line` header, e.g. `HTTP/1.1 200 OK`.
    pub fn response_line(&self) -> Option<&str> {
        self.response.header.get(HeaderKey::ResponseLine)
    }

    /// Request `Host` header.
    pub fn host(&self) -> Option<&str> {
        self.request.header.get(HeaderKey::Host)
    }
}

/// Header map and body of one side of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpMessage {
    pub header: Headers,
    pub body: String,
}

impl HttpMessage {
    /// `Content-Type` header of this message.
    pub fn content_type(&self) -> Option<&str> {
        self.header.get(HeaderKey::ContentType)
    }

    /// Body size in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

/// Addressing information for the TCP flow carrying the transaction.
///
/// `src` is the client, `dest` the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowMetadata {
    pub src_ip: String,
    pub src_port: u16,
    pub dest_ip: String,
    pub dest_port: u16,
    pub timestamp: String,
}

/// Header names the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKey {
    /// Pseudo-header holding the raw request line
    RequestLine,
    /// Pseudo-header holding the raw status line
    ResponseLine,
    Host,
    ContentType,
}

impl HeaderKey {
    /// Name as written by the sensor.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestLine => "request-line",
            Self::ResponseLine => "response-line",
            Self::Host => "Host",
            Self::ContentType => "Content-Type",
        }
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header collection with case-insensitive, string-typed lookups.
///
/// Values are kept as raw JSON so that a sensor emitting a non-string value
/// for a header does not make the whole line unparseable; such values simply
/// read back as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, serde_json::Value>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a known header.
    pub fn get(&self, key: HeaderKey) -> Option<&str> {
        self.get_by_name(key.as_str())
    }

    /// Looks up any header by name: exact match first, then ASCII
    /// case-insensitive. Absent, null and non-string values yield `None`.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        let value = match self.0.get(name) {
            Some(value) => value,
            None => {
                self.0
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))?
                    .1
            }
        };
        value.as_str()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object with keys in sorted order.
    pub fn to_canonical_string(&self) -> String {
        // A map of JSON values with string keys always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
