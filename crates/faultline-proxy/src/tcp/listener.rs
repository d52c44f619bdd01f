//! Per-`TcpRule` accept loop.

use super::copier::copy_with_faults;
use super::faults::{should_refuse, should_reset};
use faultline_core::TcpRule;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one TCP listener for the lifetime of the process (or until shutdown
/// fires), accepting connections and proxying each to `rule.upstream` with
/// the configured faults applied.
pub async fn run(rule: TcpRule, mut shutdown: watch::Receiver<bool>) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(&rule.listen).await?;
    info!(listen = %rule.listen, upstream = %rule.upstream, "TCP proxy listening");

    let rule = Arc::new(rule);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(listen = %rule.listen, "TCP listener shutting down");
                    return Ok(());
                }
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = accepted?;
                let rule = Arc::clone(&rule);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer_addr, &rule).await {
                        warn!(listen = %rule.listen, %peer_addr, error = %e, "tcp connection ended with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut downstream: TcpStream,
    peer_addr: std::net::SocketAddr,
    rule: &TcpRule,
) -> Result<(), anyhow::Error> {
    // [Accepted] -> [Closed]: refuse is checked first and skips dialing
    // entirely, before any latency is spent on this connection.
    if should_refuse(&rule.faults) {
        info!(%peer_addr, listen = %rule.listen, "refusing tcp connection per fault rule");
        crate::metrics::record_tcp_connection(&rule.listen, "refused");
        drop(downstream);
        return Ok(());
    }

    // [Accepted] -> [Dialing]: the initial per-connection latency applies
    // once here, before the reset draw and before dialing upstream.
    if rule.faults.latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(rule.faults.latency_ms)).await;
    }

    // [Dialing] -> [Closed]: reset is drawn after the latency sleep, not
    // before it — a reset still costs the connection its accept latency.
    if should_reset(&rule.faults) {
        info!(%peer_addr, listen = %rule.listen, "resetting tcp connection per fault rule");
        crate::metrics::record_tcp_connection(&rule.listen, "reset");
        downstream.set_linger(Some(Duration::ZERO)).ok();
        drop(downstream);
        return Ok(());
    }
    crate::metrics::record_tcp_connection(&rule.listen, "proceed");

    let upstream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&rule.upstream))
        .await
        .map_err(|_| anyhow::anyhow!("connect to upstream {} timed out", rule.upstream))??;

    let (down_read, down_write) = downstream.into_split();
    let (up_read, up_write) = upstream.into_split();

    let faults_down = rule.faults.clone();
    let mut c2u = tokio::spawn(async move { copy_with_faults(down_read, up_write, &faults_down).await });
    let faults_up = rule.faults.clone();
    let mut u2c = tokio::spawn(async move { copy_with_faults(up_read, down_write, &faults_up).await });

    // [Proxying] -> [Draining]: the first copier to return (EOF or error on
    // either leg) wins; the other side is aborted so both owned socket
    // halves drop and close, rather than waiting on a peer that may never
    // send more data.
    let (down, up) = tokio::select! {
        res = &mut c2u => {
            u2c.abort();
            (res, u2c.await)
        }
        res = &mut u2c => {
            c2u.abort();
            (c2u.await, res)
        }
    };

    let down = down.ok().and_then(Result::ok).unwrap_or_default();
    let up = up.ok().and_then(Result::ok).unwrap_or_default();

    crate::metrics::record_tcp_bytes(&rule.listen, "client_to_upstream", down.bytes);
    crate::metrics::record_tcp_bytes(&rule.listen, "upstream_to_client", up.bytes);
    for _ in 0..(down.dropped_chunks + up.dropped_chunks) {
        crate::metrics::record_tcp_chunk_dropped(&rule.listen);
    }
    info!(
        %peer_addr,
        listen = %rule.listen,
        bytes_down_to_up = down.bytes,
        bytes_up_to_down = up.bytes,
        chunks_down_to_up = down.chunks,
        chunks_up_to_down = up.chunks,
        chunks_dropped = down.dropped_chunks + up.dropped_chunks,
        slept_ms = down.slept_ms + up.slept_ms,
        "tcp connection closed"
    );

    Ok(())
}
