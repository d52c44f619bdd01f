//! FaultLine — a developer-facing fault injection proxy.
//!
//! ```bash
//! faultline start-api                      # HTTP proxy + control API
//! faultline start-api --http-port 9000
//! faultline start-db --config faultline.yaml
//! faultline rules add --target api.example.com --type latency --latency-ms 500
//! faultline rules list
//! ```

mod admin_api;
mod cli;
mod http;
mod lifecycle;
mod metrics;
mod network;
mod tcp;

use clap::{Parser, Subcommand};
use cli::RulesCommand;
use faultline_core::RuleStore;
use lifecycle::{StartApiOptions, StartDbOptions};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(author, version, about = "Fault injection proxy for local and CI testing", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (debug, info, warn, error). Overridden by RUST_LOG.
    #[arg(long, default_value = "info", env = "FAULTLINE_LOGLEVEL", global = true)]
    loglevel: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP (L7) reverse proxy plus its control API.
    StartApi {
        #[arg(long, value_name = "FILE", env = "FAULTLINE_CONFIG")]
        config: Option<PathBuf>,

        #[arg(
            long,
            default_value = "faultline-rules.json",
            env = "FAULTLINE_RULES_FILE"
        )]
        rules_file: PathBuf,

        #[arg(long, default_value = "0.0.0.0:8080", env = "FAULTLINE_HTTP_ADDR")]
        http_addr: SocketAddr,

        #[arg(long, default_value = "0.0.0.0:8081", env = "FAULTLINE_ADMIN_ADDR")]
        admin_addr: SocketAddr,
    },

    /// Start the TCP (L4) proxy listeners defined in the config file.
    StartDb {
        #[arg(long, value_name = "FILE", env = "FAULTLINE_CONFIG")]
        config: PathBuf,
    },

    /// Manage fault injection rules in the shared rule file.
    Rules {
        #[arg(long, default_value = "faultline-rules.json", env = "FAULTLINE_RULES_FILE")]
        rules_file: PathBuf,

        #[command(subcommand)]
        command: RulesCommand,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.loglevel.clone())))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install default rustls crypto provider"))?;

    if std::env::var("FAULTLINE_NO_BANNER").is_err() {
        print_banner();
    }

    match cli.command {
        Commands::StartApi {
            config,
            rules_file,
            http_addr,
            admin_addr,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(lifecycle::run_api(StartApiOptions {
                config_path: config,
                rules_file,
                http_addr,
                admin_addr,
            }))
        }
        Commands::StartDb { config } => {
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            runtime.block_on(lifecycle::run_db(StartDbOptions { config_path: config }))
        }
        Commands::Rules { rules_file, command } => {
            let store = RuleStore::load_or_init(&rules_file, vec![])?;
            cli::run_rules(&store, command)
        }
    }
}

fn print_banner() {
    eprintln!("faultline {}", env!("CARGO_PKG_VERSION"));
}
