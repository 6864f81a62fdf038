//! Span attribute records.
//!
//! An [`AttributeRecord`] is what the filter stage hands to the export stage:
//! a flat, typed projection of one accepted [`HttpEvent`](crate::event::HttpEvent).
//! Attribute keys are fixed because collectors and dashboards downstream
//! match on them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Span name for every exported transaction.
pub const SPAN_NAME: &str = "http.request";
/// Instrumentation scope (tracer) name.
pub const TRACER_NAME: &str = "http-monitor";

pub const ATTR_HTTP_METHOD: &str = "http.method";
pub const ATTR_HTTP_FLAVOR: &str = "http.flavor";
pub const ATTR_HTTP_TARGET: &str = "http.target";
pub const ATTR_HTTP_HOST: &str = "http.host";
pub const ATTR_HTTP_STATUS_CODE: &str = "http.status_code";
pub const ATTR_HTTP_SCHEME: &str = "http.scheme";
pub const ATTR_NET_HOST_PORT: &str = "net.host.port";
pub const ATTR_NET_PEER_IP: &str = "net.peer.ip";
pub const ATTR_NET_PEER_PORT: &str = "net.peer.port";
pub const ATTR_SENSOR_VERSION: &str = "sensor.version";
pub const ATTR_SENSOR_ID: &str = "sensor.id";
pub const ATTR_HTTP_REQUEST_BODY: &str = "http.request.body";
pub const ATTR_HTTP_REQUEST_HEADERS: &str = "http.request.headers";
pub const ATTR_HTTP_RESPONSE_HEADERS: &str = "http.response.headers";
pub const ATTR_HTTP_RESPONSE_BODY: &str = "http.response.body";

/// URL scheme inferred from the server port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    /// `https` for port 443, `http` for everything else.
    pub fn from_port(port: u16) -> Self {
        if port == 443 { Self::Https } else { Self::Http }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(_) => None,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<u16> for AttributeValue {
    fn from(n: u16) -> Self {
        Self::Int(i64::from(n))
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Everything exported for one accepted transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub method: String,
    /// Protocol version with the `HTTP/` prefix stripped, e.g. `1.1`
    pub flavor: String,
    pub target: String,
    pub host: String,
    pub status_code: u16,
    pub scheme: Scheme,
    /// Server (destination) port
    pub host_port: u16,
    /// Client (source) address
    pub peer_ip: String,
    pub peer_port: u16,
    pub request_body: String,
    /// Canonical JSON of the request headers
    pub request_headers: String,
    pub response_headers: String,
    pub response_body: String,
    pub sensor_id: String,
    pub sensor_version: String,
}

impl AttributeRecord {
    /// The span attributes in export order.
    pub fn attributes(&self) -> Vec<(&'static str, AttributeValue)> {
        vec![
            (ATTR_HTTP_METHOD, self.method.as_str().into()),
            (ATTR_HTTP_FLAVOR, self.flavor.as_str().into()),
            (ATTR_HTTP_TARGET, self.target.as_str().into()),
            (ATTR_HTTP_HOST, self.host.as_str().into()),
            (ATTR_HTTP_STATUS_CODE, self.status_code.into()),
            (ATTR_HTTP_SCHEME, self.scheme.as_str().into()),
            (ATTR_NET_HOST_PORT, self.host_port.into()),
            (ATTR_NET_PEER_IP, self.peer_ip.as_str().into()),
            (ATTR_NET_PEER_PORT, self.peer_port.into()),
            (ATTR_SENSOR_VERSION, self.sensor_version.as_str().into()),
            (ATTR_SENSOR_ID, self.sensor_id.as_str().into()),
            (ATTR_HTTP_REQUEST_BODY, self.request_body.as_str().into()),
            (ATTR_HTTP_REQUEST_HEADERS, self.request_headers.as_str().into()),
            (ATTR_HTTP_RESPONSE_HEADERS, self.response_headers.as_str().into()),
            (ATTR_HTTP_RESPONSE_BODY, self.response_body.as_str().into()),
        ]
    }
}
