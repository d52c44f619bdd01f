//! Startup wiring shared by the `start-api` and `start-db` subcommands:
//! config loading, rule store construction, and the shutdown signal plumbing
//! every accept loop in this crate selects on.

use faultline_core::{Config, RuleStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub struct StartApiOptions {
    pub config_path: Option<PathBuf>,
    pub rules_file: PathBuf,
    pub http_addr: SocketAddr,
    pub admin_addr: SocketAddr,
}

pub struct StartDbOptions {
    pub config_path: PathBuf,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, anyhow::Error> {
    match path {
        Some(path) => Ok(faultline_core::Config::load(path)?),
        None => Ok(Config::default()),
    }
}

fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

async fn wait_for_shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received ctrl-c, shutting down");
    }

    let _ = tx.send(true);
}

/// Load or seed the rule store: the persisted file, when present, is
/// authoritative over the config file's `rules:` list, which only seeds a
/// brand-new store.
fn build_rule_store(opts: &StartApiOptions) -> Result<Arc<RuleStore>, anyhow::Error> {
    let config = load_config(opts.config_path.as_ref())?;
    let store = RuleStore::load_or_init(&opts.rules_file, config.rules)?;
    Ok(Arc::new(store))
}

pub async fn run_api(opts: StartApiOptions) -> Result<(), anyhow::Error> {
    let rule_store = build_rule_store(&opts)?;
    let (tx, rx) = shutdown_channel();
    tokio::spawn(wait_for_shutdown_signal(tx));

    let http = crate::http::HttpProxyServer::new(Arc::clone(&rule_store), rx.clone());
    let admin = crate::admin_api::AdminApiServer::new(rule_store, rx);

    info!(http_addr = %opts.http_addr, admin_addr = %opts.admin_addr, "starting faultline api");

    tokio::try_join!(http.run(opts.http_addr), admin.run(opts.admin_addr))?;
    Ok(())
}

pub async fn run_db(opts: StartDbOptions) -> Result<(), anyhow::Error> {
    let config = load_config(Some(&opts.config_path))?;
    if config.tcp_rules.is_empty() {
        anyhow::bail!("no tcpRules configured in {:?}", opts.config_path);
    }

    let (tx, rx) = shutdown_channel();
    tokio::spawn(wait_for_shutdown_signal(tx));

    let mut tasks = Vec::new();
    for rule in config.tcp_rules {
        let rx = rx.clone();
        tasks.push(tokio::spawn(crate::tcp::run(rule, rx)));
    }

    for task in tasks {
        task.await??;
    }
    Ok(())
}
