//! Non-interactive CLI subcommands layered over the shared rule store.

mod rules;

pub use rules::{run as run_rules, RulesCommand};
