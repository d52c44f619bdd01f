//! `HttpProxyServer`: the accept loop and per-request fault injection pipeline.

use super::client::{create_http_client, HttpClient};
use super::fault::{decide, FaultDecision};
use super::forwarding::{error_response, forward_request_streaming, injected_response};
use super::headers::{
    cors_allow_origin_for, set_cors_trio, FaultlineHeadersExt, X_FAULTLINE_FAULT,
    X_FAULTLINE_LATENCY_MS, X_FAULTLINE_RULE_ID, VALUE_LATENCY,
};
use super::response_ext::{CountingBody, ResponseExt};
use super::target::extract_target;
use crate::network::create_listener;
use faultline_core::RuleStore;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::header::ORIGIN;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

const DRAIN_BUDGET: Duration = Duration::from_secs(5);

pub struct HttpProxyServer {
    rule_store: Arc<RuleStore>,
    http_client: HttpClient,
    shutdown: watch::Receiver<bool>,
}

impl HttpProxyServer {
    pub fn new(rule_store: Arc<RuleStore>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            rule_store,
            http_client: create_http_client(),
            shutdown,
        }
    }

    pub async fn run(self, addr: SocketAddr) -> Result<(), anyhow::Error> {
        let listener = create_listener(addr)?;
        info!(%addr, "HTTP proxy listening");

        let server = Arc::new(self);
        let mut shutdown = server.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("HTTP proxy accept loop shutting down");
                        return Ok(());
                    }
                }
                accepted = listener.accept() => {
                    let (stream, remote_addr) = accepted?;
                    let server = Arc::clone(&server);
                    let mut conn_shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let server = Arc::clone(&server);
                            async move { server.handle_request(req, remote_addr).await }
                        });

                        let conn = http1::Builder::new().serve_connection(io, service);
                        tokio::pin!(conn);

                        tokio::select! {
                            result = &mut conn => {
                                if let Err(err) = result {
                                    error!(%remote_addr, error = %err, "connection error");
                                }
                            }
                            _ = conn_shutdown.changed() => {
                                conn.as_mut().graceful_shutdown();
                                if tokio::time::timeout(DRAIN_BUDGET, conn).await.is_err() {
                                    warn!(%remote_addr, "connection did not drain within budget, dropping");
                                }
                            }
                        }
                    });
                }
            }
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible> {
        if let Err(e) = self.rule_store.reload_if_modified() {
            warn!(error = %e, "failed to reload rule store");
        }

        let method = req.method().clone();
        let start = Instant::now();
        let cors_allow_origin = cors_allow_origin_for(req.headers().get(ORIGIN));

        if method == Method::OPTIONS {
            let response = Response::builder()
                .status(200)
                .body(BoxBody::new(
                    Empty::<Bytes>::new().map_err(|never: Infallible| match never {}),
                ))
                .expect("static preflight response is always valid");
            let (mut parts, body) = response.into_parts();
            set_cors_trio(&mut parts, &cors_allow_origin);
            crate::metrics::record_http_request(method.as_str(), 200);
            return Ok(Response::from_parts(parts, body));
        }

        let original_host = req
            .headers()
            .get(hyper::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let target = extract_target(req.uri().path(), req.uri().query());
        let Some(target) = target else {
            let response =
                error_response(400, "FaultLine: request path must encode an absolute target URL")
                    .into_boxed();
            return Ok(response);
        };

        let matched = self.rule_store.find_match(&target);
        let rule_id = matched.as_ref().map(|r| r.id.clone());
        let decision = decide(matched.as_ref());

        let response = match decision {
            FaultDecision::Passthrough => {
                forward_request_streaming(
                    &self.http_client,
                    req,
                    &target,
                    &original_host,
                    &cors_allow_origin,
                )
                .await
            }
            FaultDecision::Latency { ms } => {
                crate::metrics::record_fault("http", "latency", rule_id.as_deref().unwrap_or("-"));
                crate::metrics::record_latency_injected(rule_id.as_deref().unwrap_or("-"), ms);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                let mut response = forward_request_streaming(
                    &self.http_client,
                    req,
                    &target,
                    &original_host,
                    &cors_allow_origin,
                )
                .await;
                response.set_header(&X_FAULTLINE_FAULT, &VALUE_LATENCY);
                response.set_header_value(&X_FAULTLINE_LATENCY_MS, &ms.to_string());
                if let Some(id) = &rule_id {
                    response.set_header_value(&X_FAULTLINE_RULE_ID, id);
                }
                response
            }
            FaultDecision::Error { code, body } => {
                let failure_kind = match body {
                    super::fault::TriggeredBody::Error => "error",
                    super::fault::TriggeredBody::Flaky => "flaky",
                };
                crate::metrics::record_fault("http", failure_kind, rule_id.as_deref().unwrap_or("-"));
                injected_response(code, body.text(), rule_id.as_deref().unwrap_or("-")).into_boxed()
            }
        };

        let status = response.status().as_u16();
        crate::metrics::record_http_request(method.as_str(), status);
        let (parts, body) = response.into_parts();
        let (counted_body, _) = CountingBody::new(body);
        let start_for_log = start;
        let counted_body = counted_body.with_completion_hook(move |bytes| {
            info!(
                %remote_addr,
                %method,
                target = %target,
                rule_id = rule_id.as_deref().unwrap_or("-"),
                status,
                bytes,
                elapsed_ms = start_for_log.elapsed().as_millis() as u64,
                "request handled"
            );
        });
        let response = Response::from_parts(parts, BoxBody::new(counted_body));

        Ok(response)
    }
}
