#![no_main]

use libfuzzer_sys::fuzz_target;
use netspan_core::event::HttpEvent;
use netspan_pipeline::filter::{parse_request_line, parse_status_code};

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Ok(event) = HttpEvent::from_line(line) {
            let _ = event.host();
            let _ = event.request.header.to_canonical_string();
            if let Some(request_line) = event.request_line() {
                let _ = parse_request_line(request_line);
            }
            if let Some(response_line) = event.response_line() {
                let _ = parse_status_code(response_line);
            }
        }
    }
});
