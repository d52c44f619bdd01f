//! Routes control-plane requests to their handler.
//!
//! A small hand-rolled matcher rather than a router crate: the route set is
//! fixed and tiny (rule CRUD plus two fixed endpoints), so a dependency
//! buys nothing here.

use super::handlers;
use faultline_core::RuleStore;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{Method, Request, Response};
use std::sync::Arc;

pub async fn route(store: &Arc<RuleStore>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (&method, segments.as_slice()) {
        (&Method::GET, ["health"]) => handlers::health().await,
        (&Method::GET, ["metrics"]) => handlers::metrics().await,
        (&Method::GET, ["rules"]) => handlers::list_rules(store).await,
        (&Method::POST, ["rules"]) => handlers::create_rule(store, req).await,
        (&Method::GET, ["rules", "export"]) => handlers::export_rules(store).await,
        (&Method::POST, ["rules", "import"]) => handlers::import_rules(store, req).await,
        (&Method::PUT, ["rules", id]) => handlers::update_rule(store, id, req).await,
        (&Method::DELETE, ["rules", id]) => handlers::delete_rule(store, id).await,
        (&Method::POST, ["rules", id, "enable"]) => handlers::set_enabled(store, id, true).await,
        (&Method::POST, ["rules", id, "disable"]) => handlers::set_enabled(store, id, false).await,
        _ => handlers::not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_handler_returns_ok() {
        let response = handlers::health().await;
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn list_rules_on_empty_store_returns_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RuleStore::load_or_init(dir.path().join("rules.json"), vec![]).unwrap());
        let response = handlers::list_rules(&store).await;
        assert_eq!(response.status(), 200);
    }
}
