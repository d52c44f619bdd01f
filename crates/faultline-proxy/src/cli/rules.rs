//! Non-interactive `faultline rules ...` subcommands.
//!
//! These operate directly on the file-backed rule store with no network
//! hop — the CLI and a running proxy rendezvous through the shared rule
//! file, picked up by the proxy's `reloadIfModified` check.

use clap::{Args, Subcommand};
use faultline_core::{Category, Failure, Rule, RuleStore};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Add a new fault injection rule.
    Add(AddArgs),
    /// List all rules, sorted by id.
    List,
    /// Delete a rule by id.
    Delete { id: String },
    /// Enable a rule by id.
    Enable { id: String },
    /// Disable a rule by id.
    Disable { id: String },
    /// Export all rules as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Replace all rules from a JSON file.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Substring matched against the reconstructed target URL.
    #[arg(long)]
    target: String,

    /// One of: latency, error, flaky.
    #[arg(long = "type", value_name = "TYPE")]
    failure_type: String,

    #[arg(long, default_value_t = 0)]
    latency_ms: u64,

    #[arg(long, default_value_t = 0)]
    error_code: u16,

    #[arg(long, default_value_t = 0.0)]
    probability: f64,

    #[arg(long)]
    category: Option<String>,

    #[arg(long, default_value_t = true)]
    enabled: bool,
}

fn parse_failure(args: &AddArgs) -> Result<Failure, anyhow::Error> {
    match args.failure_type.as_str() {
        "latency" => Ok(Failure::Latency {
            latency_ms: args.latency_ms,
        }),
        "error" => Ok(Failure::Error {
            error_code: args.error_code,
        }),
        "flaky" => Ok(Failure::Flaky {
            probability: args.probability,
        }),
        other => anyhow::bail!("unknown failure type '{other}', expected latency|error|flaky"),
    }
}

fn parse_category(s: &str) -> Result<Category, anyhow::Error> {
    match s.to_lowercase().as_str() {
        "api" => Ok(Category::Api),
        "database" => Ok(Category::Database),
        other => anyhow::bail!("unknown category '{other}', expected api|database"),
    }
}

pub fn run(store: &RuleStore, cmd: RulesCommand) -> Result<(), anyhow::Error> {
    match cmd {
        RulesCommand::Add(args) => {
            let failure = parse_failure(&args)?;
            if let Some(reason) = failure.validation_error() {
                anyhow::bail!("invalid failure: {reason}");
            }
            let category = args.category.as_deref().map(parse_category).transpose()?;
            let rule =
                Rule::new_with_generated_id(args.target.clone(), failure, args.enabled, category);
            let created = store.add(rule)?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        RulesCommand::List => {
            println!("{}", serde_json::to_string_pretty(&store.get_all())?);
        }
        RulesCommand::Delete { id } => {
            if store.delete(&id)? {
                println!("deleted {id}");
            } else {
                anyhow::bail!("no such rule: {id}");
            }
        }
        RulesCommand::Enable { id } => {
            set_enabled(store, &id, true)?;
        }
        RulesCommand::Disable { id } => {
            set_enabled(store, &id, false)?;
        }
        RulesCommand::Export { out } => {
            let json = store.export()?;
            match out {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{json}"),
            }
        }
        RulesCommand::Import { file } => {
            let json = std::fs::read_to_string(&file)?;
            let count = store.import(&json)?;
            println!("imported {count} rules from {file:?}");
        }
    }
    Ok(())
}

fn set_enabled(store: &RuleStore, id: &str, enabled: bool) -> Result<(), anyhow::Error> {
    match store.set_enabled(id, enabled)? {
        Some(rule) => {
            println!("{}", serde_json::to_string_pretty(&rule)?);
            Ok(())
        }
        None => anyhow::bail!("no such rule: {id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RuleStore {
        let dir = tempfile::tempdir().unwrap();
        RuleStore::load_or_init(dir.path().join("rules.json"), vec![]).unwrap()
    }

    #[test]
    fn add_list_delete_round_trip() {
        let store = store();
        let args = AddArgs {
            target: "example.test".into(),
            failure_type: "latency".into(),
            latency_ms: 200,
            error_code: 0,
            probability: 0.0,
            category: None,
            enabled: true,
        };
        run(&store, RulesCommand::Add(args)).unwrap();
        assert_eq!(store.get_all().len(), 1);

        let id = store.get_all()[0].id.clone();
        run(&store, RulesCommand::Disable { id: id.clone() }).unwrap();
        assert!(!store.get(&id).unwrap().enabled);

        run(&store, RulesCommand::Delete { id }).unwrap();
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn add_rejects_unknown_failure_type() {
        let store = store();
        let args = AddArgs {
            target: "example.test".into(),
            failure_type: "teleport".into(),
            latency_ms: 0,
            error_code: 0,
            probability: 0.0,
            category: None,
            enabled: true,
        };
        assert!(run(&store, RulesCommand::Add(args)).is_err());
    }
}
