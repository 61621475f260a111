//! Forwarded-header allowlist.
//!
//! Unlike a transparent proxy that forwards everything but a hop-by-hop denylist,
//! this proxy rewrites the request body and reconstructs the upstream URL itself, so
//! only a narrow allowlist of headers the upstream actually needs crosses the hop.

use http::HeaderMap;
use reqwest::RequestBuilder;

const FORWARDED_HEADER_NAMES: [&str; 3] = ["authorization", "x-api-key", "anthropic-version"];

/// Copy only the allowlisted headers from the inbound request onto the outbound
/// `RequestBuilder`. `Content-Type` is set separately by the caller for methods that
/// carry a body.
pub fn insert_forwarded_headers(mut request: RequestBuilder, headers: &HeaderMap) -> RequestBuilder {
    for name in FORWARDED_HEADER_NAMES {
        if let Some(value) = headers.get(name) {
            request = request.header(name, value);
        }
    }

    request
}
