//! `faultline.yaml` loading: the seed rule set and static TCP rules.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Rule, TcpRule};

/// Top-level shape of `faultline.yaml`.
///
/// `rules` seeds the persisted rule store on first run only — once the
/// rule file exists on disk, it is authoritative and this list is ignored.
/// `tcp_rules` is read fresh at every `start-db` invocation; TCP listeners
/// are not reconfigurable at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, rename = "tcpRules")]
    pub tcp_rules: Vec<TcpRule>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        for tcp_rule in &mut config.tcp_rules {
            tcp_rule.faults.normalize();
            if tcp_rule.upstream.is_empty() {
                return Err(ConfigError::InvalidTcpRule {
                    listen: tcp_rule.listen.clone(),
                    reason: "upstream must not be empty".to_string(),
                });
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_rules_and_tcp_rules_and_normalizes_probabilities() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
rules:
  - id: r1
    target: example.test
    enabled: true
    failure:
      type: latency
      latencyMs: 200
tcpRules:
  - listen: "127.0.0.1:9000"
    upstream: "127.0.0.1:5432"
    faults:
      dropProbability: 5.0
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.tcp_rules.len(), 1);
        assert_eq!(config.tcp_rules[0].faults.drop_probability, 1.0);
    }

    #[test]
    fn loads_documented_seed_shape_without_id_or_enabled() {
        // spec.md §6's documented `rules:` entry shape: `{target, failure:
        // {type, latency_ms?, error_code?, probability?}}` — no `id`, no
        // `enabled`, snake_case fault fields.
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
rules:
  - target: https://api.example.test
    failure:
      type: latency
      latency_ms: 500
  - target: https://api.example.test/flaky
    failure:
      type: flaky
      probability: 0.5
  - target: https://api.example.test/broken
    failure:
      type: error
      error_code: 503
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.rules.len(), 3);
        assert!(config.rules.iter().all(|r| r.enabled));
        assert!(config.rules.iter().all(|r| !r.id.is_empty()));
        let ids: std::collections::HashSet<_> = config.rules.iter().map(|r| &r.id).collect();
        assert_eq!(ids.len(), 3, "each seeded rule gets its own generated id");
        assert_eq!(
            config.rules[0].failure,
            crate::model::Failure::Latency { latency_ms: 500 }
        );
    }

    #[test]
    fn rejects_tcp_rule_with_empty_upstream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
tcpRules:
  - listen: "127.0.0.1:9000"
    upstream: ""
"#
        )
        .unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTcpRule { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load(Path::new("/nonexistent/faultline.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
