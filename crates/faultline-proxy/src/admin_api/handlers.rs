//! Thin request handlers: each one maps directly to a `RuleStore` operation.
//! No business logic lives here beyond translating HTTP <-> store calls.

use faultline_core::{Rule, RuleStore, StoreError};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static header values are always valid")
}

fn error_body(message: impl std::fmt::Display) -> String {
    format!(r#"{{"error":"{message}"}}"#)
}

fn store_error_response(err: StoreError) -> Response<Full<Bytes>> {
    json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(err))
}

async fn read_json_body(req: Request<Incoming>) -> Result<String, Response<Full<Bytes>>> {
    req.collect()
        .await
        .map(|collected| String::from_utf8_lossy(&collected.to_bytes()).into_owned())
        .map_err(|e| json_response(StatusCode::BAD_REQUEST, error_body(e)))
}

pub async fn list_rules(store: &Arc<RuleStore>) -> Response<Full<Bytes>> {
    match serde_json::to_string(&store.get_all()) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => json_response(StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

pub async fn create_rule(store: &Arc<RuleStore>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let rule: Rule = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => return json_response(StatusCode::BAD_REQUEST, error_body(e)),
    };
    match store.add(rule) {
        Ok(created) => json_response(
            StatusCode::CREATED,
            serde_json::to_string(&created).unwrap_or_default(),
        ),
        Err(e) => store_error_response(e),
    }
}

pub async fn update_rule(
    store: &Arc<RuleStore>,
    id: &str,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let body = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let rule: Rule = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => return json_response(StatusCode::BAD_REQUEST, error_body(e)),
    };
    match store.update(id, rule) {
        Ok(Some(updated)) => json_response(
            StatusCode::OK,
            serde_json::to_string(&updated).unwrap_or_default(),
        ),
        Ok(None) => json_response(StatusCode::NOT_FOUND, error_body("rule not found")),
        Err(e) => store_error_response(e),
    }
}

pub async fn delete_rule(store: &Arc<RuleStore>, id: &str) -> Response<Full<Bytes>> {
    match store.delete(id) {
        Ok(true) => json_response(StatusCode::NO_CONTENT, String::new()),
        Ok(false) => json_response(StatusCode::NOT_FOUND, error_body("rule not found")),
        Err(e) => store_error_response(e),
    }
}

pub async fn set_enabled(store: &Arc<RuleStore>, id: &str, enabled: bool) -> Response<Full<Bytes>> {
    match store.set_enabled(id, enabled) {
        Ok(Some(rule)) => json_response(
            StatusCode::OK,
            serde_json::to_string(&rule).unwrap_or_default(),
        ),
        Ok(None) => json_response(StatusCode::NOT_FOUND, error_body("rule not found")),
        Err(e) => store_error_response(e),
    }
}

pub async fn export_rules(store: &Arc<RuleStore>) -> Response<Full<Bytes>> {
    match store.export() {
        Ok(json) => json_response(StatusCode::OK, json),
        Err(e) => store_error_response(e),
    }
}

pub async fn import_rules(store: &Arc<RuleStore>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let body = match read_json_body(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    match store.import(&body) {
        Ok(count) => json_response(StatusCode::OK, format!(r#"{{"imported":{count}}}"#)),
        Err(e) => store_error_response(e),
    }
}

pub async fn health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, r#"{"status":"ok"}"#.to_string())
}

pub async fn metrics() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4")
        .body(Full::new(Bytes::from(crate::metrics::collect_metrics())))
        .expect("static header values are always valid")
}

pub fn not_found() -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, error_body("no such route"))
}
