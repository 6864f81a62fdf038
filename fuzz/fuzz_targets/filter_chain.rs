#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use netspan_core::config::{MissingFieldPolicy, NetspanConfig};
use netspan_core::event::HttpEvent;
use netspan_pipeline::filter::FilterPolicy;

/// Structured transaction for the filter chain
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    fill_defaults: bool,
    max_body_size: u16,
    accept_hosts: Vec<String>,
    deny_content_types: Vec<String>,
    request_headers: Vec<(String, String)>,
    response_headers: Vec<(String, String)>,
    request_body: String,
    response_body: String,
    src_ip: String,
    src_port: u16,
    dest_port: u16,
}

fuzz_target!(|input: FuzzInput| {
    let mut config = NetspanConfig::default();
    config.sensor.accept_hosts = input.accept_hosts.into_iter().take(8).collect();
    config.sensor.deny_content_types = input.deny_content_types.into_iter().take(8).collect();
    config.pipeline.max_body_size = usize::from(input.max_body_size).max(1);
    config.pipeline.missing_fields = if input.fill_defaults {
        MissingFieldPolicy::FillDefaults
    } else {
        MissingFieldPolicy::Reject
    };
    let policy = FilterPolicy::from_config(&config);

    let mut event = HttpEvent::default();
    event.request.header = input.request_headers.into_iter().take(16).collect();
    event.response.header = input.response_headers.into_iter().take(16).collect();
    event.request.body = input.request_body;
    event.response.body = input.response_body;
    event.metadata.src_ip = input.src_ip;
    event.metadata.src_port = input.src_port;
    event.metadata.dest_port = input.dest_port;

    if let Ok(record) = policy.evaluate(event) {
        assert!(config.sensor.accept_hosts.contains(&record.host));
        assert_eq!(record.attributes().len(), 15);
    }
});
