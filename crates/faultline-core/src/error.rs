//! Error types for the rule store and configuration loading.

use std::path::PathBuf;

/// Errors that can occur while reading, writing, or reloading the rule store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read rule file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to stat rule file {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while loading `faultline.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid tcp rule '{listen}': {reason}")]
    InvalidTcpRule { listen: String, reason: String },
}
