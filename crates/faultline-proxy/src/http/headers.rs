//! Safe header insertion helpers for FaultLine's response annotations.

use hyper::header::{HeaderName, HeaderValue};
use hyper::http::response::Parts;
use hyper::Response;

pub static X_FAULTLINE_FAULT: HeaderName = HeaderName::from_static("x-faultline-fault");
pub static X_FAULTLINE_RULE_ID: HeaderName = HeaderName::from_static("x-faultline-rule-id");
pub static X_FAULTLINE_LATENCY_MS: HeaderName = HeaderName::from_static("x-faultline-latency-ms");
pub static X_FAULTLINE_PROXIED: HeaderName = HeaderName::from_static("x-faultline-proxied");

pub static VALUE_TRUE: HeaderValue = HeaderValue::from_static("true");
pub static VALUE_ERROR: HeaderValue = HeaderValue::from_static("error");
pub static VALUE_LATENCY: HeaderValue = HeaderValue::from_static("latency");

/// CORS response headers the upstream may set that FaultLine always
/// overrides with its own single-origin policy rather than passing through.
const CORS_RESPONSE_HEADERS: [&str; 3] = [
    "access-control-allow-origin",
    "access-control-allow-headers",
    "access-control-allow-methods",
];

pub trait FaultlineHeadersExt {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;
}

impl<B> FaultlineHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers_mut().insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}

impl FaultlineHeadersExt for Parts {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers.insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.headers.insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }
}

/// Strip any upstream-set CORS headers and install FaultLine's own policy.
pub fn normalize_cors(parts: &mut Parts, allow_origin: &HeaderValue) {
    for name in CORS_RESPONSE_HEADERS {
        parts.headers.remove(name);
    }
    parts
        .headers
        .insert("access-control-allow-origin", allow_origin.clone());
}

/// The `Access-Control-Allow-Origin` value for one request: the incoming
/// `Origin` header when present and well-formed, `*` otherwise — this is
/// what guarantees the client never sees a duplicated ACAO value.
pub fn cors_allow_origin_for(origin_header: Option<&HeaderValue>) -> HeaderValue {
    match origin_header {
        Some(value) if !value.is_empty() => value.clone(),
        _ => HeaderValue::from_static("*"),
    }
}

/// Set the full CORS trio on a preflight `OPTIONS` response.
pub fn set_cors_trio(parts: &mut Parts, allow_origin: &HeaderValue) {
    parts
        .headers
        .insert("access-control-allow-origin", allow_origin.clone());
    parts.headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("*"),
    );
    parts.headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
}

#[cfg(test)]
mod cors_tests {
    use super::*;

    #[test]
    fn cors_allow_origin_echoes_incoming_origin() {
        let origin = HeaderValue::from_static("https://app.example.test");
        assert_eq!(cors_allow_origin_for(Some(&origin)), origin);
    }

    #[test]
    fn cors_allow_origin_defaults_to_star_when_absent() {
        assert_eq!(cors_allow_origin_for(None), HeaderValue::from_static("*"));
    }
}
