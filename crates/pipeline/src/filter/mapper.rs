//! Field extraction and record construction.
//!
//! Request line: `METHOD TARGET PROTO` (single-space separated).
//! Response line: `PROTO STATUS REASON...`.

use netspan_core::config::MissingFieldPolicy;
use netspan_core::event::HttpEvent;
use netspan_core::record::{AttributeRecord, Scheme};

/// Method, target and flavor taken from a request line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub flavor: &'a str,
}

/// Splits `GET /foo HTTP/1.1` into its parts.
///
/// Tokens missing from the line come back empty. The flavor is the third
/// token with everything up to and including the first `/` removed.
pub fn parse_request_line(line: &str) -> RequestLine<'_> {
    let mut parts = line.split(' ');
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    let flavor = parts
        .next()
        .map(|proto| proto.split_once('/').map_or(proto, |(_, version)| version))
        .unwrap_or_default();
    RequestLine {
        method,
        target,
        flavor,
    }
}

/// Status code from `HTTP/1.1 200 OK`; `None` if absent or not a `u16`.
pub fn parse_status_code(line: &str) -> Option<u16> {
    line.split(' ').nth(1)?.parse().ok()
}

/// Fields of an event the filter chain requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub method: String,
    pub target: String,
    pub flavor: String,
    pub host: String,
    pub status_code: u16,
}

/// Pulls the required fields out of `event`.
///
/// Returns the names of missing fields under [`MissingFieldPolicy::Reject`];
/// under [`MissingFieldPolicy::FillDefaults`] missing values stay empty or 0.
pub fn extract_fields(
    event: &HttpEvent,
    policy: MissingFieldPolicy,
) -> Result<ExtractedFields, Vec<&'static str>> {
    let request = parse_request_line(event.request_line().unwrap_or_default());
    let status_code = event
        .response_line()
        .and_then(parse_status_code)
        .unwrap_or(0);

    let fields = ExtractedFields {
        method: request.method.to_owned(),
        target: request.target.to_owned(),
        flavor: request.flavor.to_owned(),
        host: event.host().unwrap_or_default().to_owned(),
        status_code,
    };

    if policy == MissingFieldPolicy::FillDefaults {
        return Ok(fields);
    }

    let mut missing = Vec::new();
    if fields.host.is_empty() {
        missing.push("host");
    }
    if fields.method.is_empty() {
        missing.push("method");
    }
    if fields.target.is_empty() {
        missing.push("target");
    }
    if fields.status_code == 0 {
        missing.push("status_code");
    }
    if event.metadata.src_ip.is_empty() {
        missing.push("peer_ip");
    }

    if missing.is_empty() {
        Ok(fields)
    } else {
        Err(missing)
    }
}

/// Consumes an accepted event into its attribute record.
pub fn build_record(
    event: HttpEvent,
    fields: ExtractedFields,
    sensor_id: &str,
    sensor_version: &str,
) -> AttributeRecord {
    let request_headers = event.request.header.to_canonical_string();
    let response_headers = event.response.header.to_canonical_string();

    AttributeRecord {
        method: fields.method,
        flavor: fields.flavor,
        target: fields.target,
        host: fields.host,
        status_code: fields.status_code,
        scheme: Scheme::from_port(event.metadata.dest_port),
        host_port: event.metadata.dest_port,
        peer_ip: event.metadata.src_ip,
        peer_port: event.metadata.src_port,
        request_body: event.request.body,
        request_headers,
        response_headers,
        response_body: event.response.body,
        sensor_id: sensor_id.to_owned(),
        sensor_version: sensor_version.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netspan_core::event::Headers;

    fn event(request_line: Option<&str>, response_line: Option<&str>) -> HttpEvent {
        let mut event = HttpEvent::default();
        if let Some(line) = request_line {
            event.request.header.insert("request-line", line);
        }
        event.request.header.insert("Host", "example.com");
        if let Some(line) = response_line {
            event.response.header.insert("response-line", line);
        }
        event.metadata.src_ip = "10.0.0.5".to_owned();
        event.metadata.src_port = 51514;
        event.metadata.dest_port = 443;
        event
    }

    #[test]
    fn request_line_full() {
        let line = parse_request_line("GET /foo HTTP/1.1");
        assert_eq!(line.method, "GET");
        assert_eq!(line.target, "/foo");
        assert_eq!(line.flavor, "1.1");
    }

    #[test]
    fn request_line_without_protocol() {
        let line = parse_request_line("GET /foo");
        assert_eq!(line.method, "GET");
        assert_eq!(line.target, "/foo");
        assert_eq!(line.flavor, "");
    }

    #[test]
    fn request_line_flavor_without_slash_is_kept() {
        assert_eq!(parse_request_line("GET / 2").flavor, "2");
        assert_eq!(parse_request_line("PRI * HTTP/2.0").flavor, "2.0");
    }

    #[test]
    fn request_line_double_space_yields_empty_target() {
        let line = parse_request_line("GET  /foo HTTP/1.1");
        assert_eq!(line.method, "GET");
        assert_eq!(line.target, "");
    }

    #[test]
    fn status_code_parsing() {
        assert_eq!(parse_status_code("HTTP/1.1 200 OK"), Some(200));
        assert_eq!(parse_status_code("HTTP/1.1 404 Not Found"), Some(404));
        assert_eq!(parse_status_code("HTTP/1.1"), None);
        assert_eq!(parse_status_code("HTTP/1.1 abc"), None);
        assert_eq!(parse_status_code("HTTP/1.1 70000"), None);
    }

    #[test]
    fn extract_complete_event() {
        let event = event(Some("GET /foo HTTP/1.1"), Some("HTTP/1.1 200 OK"));
        let fields = extract_fields(&event, MissingFieldPolicy::Reject).unwrap();
        assert_eq!(fields.method, "GET");
        assert_eq!(fields.target, "/foo");
        assert_eq!(fields.flavor, "1.1");
        assert_eq!(fields.host, "example.com");
        assert_eq!(fields.status_code, 200);
    }

    #[test]
    fn missing_request_line_names_fields() {
        let event = event(None, Some("HTTP/1.1 200 OK"));
        let missing = extract_fields(&event, MissingFieldPolicy::Reject).unwrap_err();
        assert_eq!(missing, vec!["method", "target"]);
    }

    #[test]
    fn missing_response_line_names_status() {
        let event = event(Some("GET / HTTP/1.1"), None);
        let missing = extract_fields(&event, MissingFieldPolicy::Reject).unwrap_err();
        assert_eq!(missing, vec!["status_code"]);
    }

    #[test]
    fn zero_status_is_missing() {
        let event = event(Some("GET / HTTP/1.1"), Some("HTTP/1.1 0 ?"));
        let missing = extract_fields(&event, MissingFieldPolicy::Reject).unwrap_err();
        assert_eq!(missing, vec!["status_code"]);
    }

    #[test]
    fn fill_defaults_accepts_incomplete_event() {
        let mut event = event(None, None);
        event.metadata.src_ip.clear();
        let fields = extract_fields(&event, MissingFieldPolicy::FillDefaults).unwrap();
        assert_eq!(fields.method, "");
        assert_eq!(fields.status_code, 0);
    }

    #[test]
    fn build_record_maps_metadata() {
        let mut event = event(Some("GET /foo HTTP/1.1"), Some("HTTP/1.1 200 OK"));
        event.request.body = "ping".to_owned();
        event.response.body = "pong".to_owned();
        let fields = extract_fields(&event, MissingFieldPolicy::Reject).unwrap();

        let record = build_record(event, fields, "sensor-a", "0.1.0");
        assert_eq!(record.scheme, Scheme::Https);
        assert_eq!(record.host_port, 443);
        assert_eq!(record.peer_ip, "10.0.0.5");
        assert_eq!(record.peer_port, 51514);
        assert_eq!(record.request_body, "ping");
        assert_eq!(record.response_body, "pong");
        assert_eq!(record.sensor_id, "sensor-a");
        assert!(record.request_headers.contains("\"Host\":\"example.com\""));
        assert_eq!(
            record.response_headers,
            r#"{"response-line":"HTTP/1.1 200 OK"}"#
        );
    }

    #[test]
    fn build_record_plain_http() {
        let mut event = event(Some("GET / HTTP/1.1"), Some("HTTP/1.1 200 OK"));
        event.metadata.dest_port = 8080;
        event.response.header = Headers::new();
        let fields = ExtractedFields::default();
        let record = build_record(event, fields, "", "");
        assert_eq!(record.scheme, Scheme::Http);
        assert_eq!(record.response_headers, "{}");
    }
}
