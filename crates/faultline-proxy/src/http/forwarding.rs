//! Forwarding a request to its decoded target with a streaming body.

use super::client::HttpClient;
use super::headers::{
    normalize_cors, FaultlineHeadersExt, X_FAULTLINE_FAULT, X_FAULTLINE_PROXIED,
    X_FAULTLINE_RULE_ID, VALUE_ERROR, VALUE_TRUE,
};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response};
use std::convert::Infallible;
use tracing::error;

/// Diagnostic error body for proxy-level failures (bad target URL, upstream
/// unreachable) — these carry a human-readable summary, unlike the fixed
/// strings an injected fault responds with.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

/// A response short-circuited by an `error`/`flaky` fault: the body is one
/// of the two fixed strings the wire contract pins, annotated with which
/// rule fired.
pub fn injected_response(status: u16, body: &'static str, rule_id: &str) -> Response<Full<Bytes>> {
    let mut response = Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))));
    response.set_header(&X_FAULTLINE_FAULT, &VALUE_ERROR);
    response.set_header_value(&X_FAULTLINE_RULE_ID, rule_id);
    response
}

/// Forward a request to `target_url`, streaming both the request and
/// response bodies without buffering, and normalizing CORS headers on the
/// way back.
///
/// The outgoing request's URI, `Host` header, and `X-Forwarded-Host` are
/// all rewritten from `target_url` / `original_host`, per the spec's
/// requirement that the forwarded request never leak the proxy's own
/// path convention upstream.
pub async fn forward_request_streaming(
    http_client: &HttpClient,
    req: Request<hyper::body::Incoming>,
    target_url: &str,
    original_host: &str,
    cors_allow_origin: &HeaderValue,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let method = req.method().clone();
    let headers = req.headers().clone();

    let target_host = hyper::Uri::try_from(target_url)
        .ok()
        .and_then(|uri| uri.authority().map(|a| a.to_string()));

    let mut upstream_req = Request::builder().method(method).uri(target_url);
    for (key, value) in headers.iter() {
        if key != HOST {
            upstream_req = upstream_req.header(key, value);
        }
    }
    if let Some(host) = &target_host {
        upstream_req = upstream_req.header(HOST, host.as_str());
    }
    if !original_host.is_empty() {
        upstream_req = upstream_req.header("x-forwarded-host", original_host);
    }

    let upstream_req = match upstream_req.body(BoxBody::new(req.into_body())) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to build upstream request");
            return error_response(502, "FaultLine: failed to build upstream request")
                .map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})));
        }
    };

    match http_client.request(upstream_req).await {
        Ok(upstream_response) => {
            let (mut parts, body) = upstream_response.into_parts();
            normalize_cors(&mut parts, cors_allow_origin);
            parts.set_header(&X_FAULTLINE_PROXIED, &VALUE_TRUE);
            Response::from_parts(parts, BoxBody::new(body))
        }
        Err(e) => {
            error!(error = %e, target = target_url, "failed to forward request to upstream");
            error_response(502, &format!("FaultLine: Bad Gateway: {e}"))
                .map(|b| BoxBody::new(b.map_err(|never: Infallible| match never {})))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::fault::{TriggeredBody, INJECTED_ERROR_BODY, INJECTED_FLAKY_BODY};

    #[tokio::test]
    async fn injected_response_uses_fixed_error_body() {
        let response = injected_response(503, TriggeredBody::Error.text(), "rule-1");
        assert_eq!(response.status(), 503);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, INJECTED_ERROR_BODY.as_bytes());
    }

    #[tokio::test]
    async fn injected_response_uses_fixed_flaky_body() {
        let response = injected_response(503, TriggeredBody::Flaky.text(), "rule-2");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, INJECTED_FLAKY_BODY.as_bytes());
    }

    #[test]
    fn error_response_carries_diagnostic_message() {
        let response = error_response(502, "bad gateway");
        assert_eq!(response.status(), 502);
    }
}
