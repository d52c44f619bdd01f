//! The control-plane HTTP server: a thin accept loop around [`super::router::route`].

use super::router::route;
use crate::network::create_listener;
use faultline_core::RuleStore;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub struct AdminApiServer {
    rule_store: Arc<RuleStore>,
    shutdown: watch::Receiver<bool>,
}

impl AdminApiServer {
    pub fn new(rule_store: Arc<RuleStore>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            rule_store,
            shutdown,
        }
    }

    pub async fn run(self, addr: SocketAddr) -> Result<(), anyhow::Error> {
        let listener = create_listener(addr)?;
        info!(%addr, "control API listening");

        let store = self.rule_store;
        let mut shutdown = self.shutdown;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("control API shutting down");
                        return Ok(());
                    }
                }
                accepted = listener.accept() => {
                    let (stream, remote_addr) = accepted?;
                    let store = Arc::clone(&store);

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let store = Arc::clone(&store);
                            async move { Ok::<_, std::convert::Infallible>(route(&store, req).await) }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            error!(%remote_addr, error = %err, "control API connection error");
                        }
                    });
                }
            }
        }
    }
}
