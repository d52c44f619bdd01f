//! The concurrent, file-backed rule store.
//!
//! A single `parking_lot::RwLock` guards the in-memory map; readers (the
//! proxy's hot path, `findMatch`) never block on each other, writers (the
//! control API, the CLI) serialize. Persistence writes to a temp file next
//! to the target and renames it into place, so a reader crashing mid-write
//! never observes a truncated rule file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::error;

use crate::error::StoreError;
use crate::model::Rule;

struct StoreState {
    rules: BTreeMap<String, Rule>,
    last_loaded: SystemTime,
}

pub struct RuleStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

fn mtime(path: &Path) -> Result<Option<SystemTime>, StoreError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.modified().map_err(|source| StoreError::Stat {
            path: path.to_path_buf(),
            source,
        })?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Stat {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_rules(path: &Path) -> Result<BTreeMap<String, Rule>, StoreError> {
    let data = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules: Vec<Rule> = serde_json::from_str(&data).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rules.into_iter().map(|r| (r.id.clone(), r)).collect())
}

impl RuleStore {
    /// Load rules from `path`, or start empty if it doesn't exist yet — the
    /// file is created on first mutation rather than eagerly at startup.
    pub fn load_or_init(path: impl Into<PathBuf>, seed: Vec<Rule>) -> Result<Self, StoreError> {
        let path = path.into();
        let (rules, last_loaded) = match mtime(&path)? {
            Some(m) => (read_rules(&path)?, m),
            None => (
                seed.into_iter().map(|r| (r.id.clone(), r)).collect(),
                SystemTime::now(),
            ),
        };
        Ok(Self {
            path,
            state: RwLock::new(StoreState { rules, last_loaded }),
        })
    }

    /// All rules, sorted ascending by id (the store's natural `BTreeMap` order).
    pub fn get_all(&self) -> Vec<Rule> {
        self.state.read().rules.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Rule> {
        self.state.read().rules.get(id).cloned()
    }

    /// Persistence failures here are logged, not surfaced — per the store's
    /// failure semantics, a caller that successfully mutates the in-memory
    /// map always sees a successful result, even if the backing file could
    /// not be written.
    pub fn add(&self, rule: Rule) -> Result<Rule, StoreError> {
        let mut state = self.state.write();
        state.rules.insert(rule.id.clone(), rule.clone());
        self.persist_locked(&state.rules);
        Ok(rule)
    }

    pub fn update(&self, id: &str, rule: Rule) -> Result<Option<Rule>, StoreError> {
        let mut state = self.state.write();
        if !state.rules.contains_key(id) {
            return Ok(None);
        }
        state.rules.insert(id.to_string(), rule.clone());
        self.persist_locked(&state.rules);
        Ok(Some(rule))
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write();
        let existed = state.rules.remove(id).is_some();
        if existed {
            self.persist_locked(&state.rules);
        }
        Ok(existed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<Rule>, StoreError> {
        let mut state = self.state.write();
        let Some(rule) = state.rules.get_mut(id) else {
            return Ok(None);
        };
        rule.enabled = enabled;
        let updated = rule.clone();
        self.persist_locked(&state.rules);
        Ok(Some(updated))
    }

    /// First enabled rule whose `target` is a prefix of `candidate`, in
    /// ascending id order. Disabled rules are never matched.
    pub fn find_match(&self, candidate: &str) -> Option<Rule> {
        self.state
            .read()
            .rules
            .values()
            .find(|r| r.enabled && candidate.starts_with(r.target.as_str()))
            .cloned()
    }

    /// Export the current rule set as pretty-printed JSON.
    pub fn export(&self) -> Result<String, StoreError> {
        let rules = self.get_all();
        serde_json::to_string_pretty(&rules).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the entire rule set from a JSON document, atomically.
    pub fn import(&self, json: &str) -> Result<usize, StoreError> {
        let rules: Vec<Rule> = serde_json::from_str(json).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let mut state = self.state.write();
        state.rules = rules.into_iter().map(|r| (r.id.clone(), r)).collect();
        self.persist_locked(&state.rules);
        Ok(state.rules.len())
    }

    /// Re-read from disk if the file's mtime has advanced since the last
    /// load, so a long-running proxy observes edits made by the CLI.
    pub fn reload_if_modified(&self) -> Result<bool, StoreError> {
        let Some(current) = mtime(&self.path)? else {
            return Ok(false);
        };
        let mut state = self.state.write();
        if current <= state.last_loaded {
            return Ok(false);
        }
        state.rules = read_rules(&self.path)?;
        state.last_loaded = current;
        Ok(true)
    }

    /// Write the rule set to a temp file and rename it into place. A failure
    /// here is logged and otherwise swallowed: the in-memory mutation that
    /// triggered this persist has already happened and must not be undone
    /// or reported as a failure to the caller (spec.md §4.1, §7 item 6).
    fn persist_locked(&self, rules: &BTreeMap<String, Rule>) {
        if let Err(e) = self.try_persist_locked(rules) {
            error!(path = ?self.path, error = %e, "failed to persist rule store");
        }
    }

    fn try_persist_locked(&self, rules: &BTreeMap<String, Rule>) -> Result<(), StoreError> {
        let values: Vec<&Rule> = rules.values().collect();
        let data = serde_json::to_vec_pretty(&values).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).map_err(|source| StoreError::Read {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Failure;

    fn rule(id: &str, target: &str, enabled: bool) -> Rule {
        Rule {
            id: id.to_string(),
            target: target.to_string(),
            enabled,
            category: None,
            failure: Failure::Latency { latency_ms: 100 },
        }
    }

    #[test]
    fn load_or_init_starts_empty_and_seeds_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let store = RuleStore::load_or_init(&path, vec![rule("a", "example.test", true)]).unwrap();
        assert_eq!(store.get_all().len(), 1);
        assert!(!path.exists(), "file should not exist until first mutation");
    }

    #[test]
    fn add_persists_and_get_all_is_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let store = RuleStore::load_or_init(&path, vec![]).unwrap();
        store.add(rule("b", "b.test", true)).unwrap();
        store.add(rule("a", "a.test", true)).unwrap();
        let all = store.get_all();
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(path.exists());
    }

    #[test]
    fn find_match_skips_disabled_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::load_or_init(dir.path().join("rules.json"), vec![]).unwrap();
        store.add(rule("a", "https://flaky.test", false)).unwrap();
        assert!(store.find_match("https://flaky.test/x").is_none());
        store.set_enabled("a", true).unwrap();
        assert!(store.find_match("https://flaky.test/x").is_some());
    }

    #[test]
    fn find_match_requires_prefix_not_substring() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::load_or_init(dir.path().join("rules.json"), vec![]).unwrap();
        store.add(rule("a", "example.test", true)).unwrap();
        // "example.test" appears inside this candidate but not as a prefix.
        assert!(store.find_match("https://not-example.test/x").is_none());
        assert!(store.find_match("example.test/x").is_some());
    }

    #[test]
    fn export_import_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::load_or_init(dir.path().join("rules.json"), vec![]).unwrap();
        store.add(rule("a", "a.test", true)).unwrap();
        store.add(rule("b", "b.test", false)).unwrap();
        let exported = store.export().unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        let store2 = RuleStore::load_or_init(dir2.path().join("rules.json"), vec![]).unwrap();
        let count = store2.import(&exported).unwrap();
        assert_eq!(count, 2);
        assert_eq!(store2.get_all(), store.get_all());
    }

    #[test]
    fn reload_if_modified_picks_up_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        let store = RuleStore::load_or_init(&path, vec![]).unwrap();
        store.add(rule("a", "a.test", true)).unwrap();

        // Simulate a second process writing a new rule set.
        std::thread::sleep(std::time::Duration::from_millis(10));
        let other = RuleStore::load_or_init(&path, vec![]).unwrap();
        other.add(rule("z", "z.test", true)).unwrap();

        let changed = store.reload_if_modified().unwrap();
        assert!(changed);
        assert_eq!(store.get_all().len(), 1);
        assert_eq!(store.get_all()[0].id, "z");
    }

    #[test]
    fn toggling_enabled_twice_returns_to_original_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::load_or_init(dir.path().join("rules.json"), vec![]).unwrap();
        store.add(rule("a", "a.test", true)).unwrap();
        store.set_enabled("a", false).unwrap();
        store.set_enabled("a", true).unwrap();
        assert!(store.get("a").unwrap().enabled);
    }

    #[test]
    fn mutation_succeeds_in_memory_even_when_persist_fails() {
        let dir = tempfile::tempdir().unwrap();
        // Point the rule file at a path whose parent directory doesn't
        // exist, so every persist attempt fails at the temp-file write.
        let path = dir.path().join("missing-parent").join("rules.json");
        let store = RuleStore::load_or_init(&path, vec![]).unwrap();

        let created = store.add(rule("a", "a.test", true));
        assert!(created.is_ok(), "add must succeed even if persisting fails");
        assert_eq!(store.get_all().len(), 1);

        let updated = store.set_enabled("a", false);
        assert!(updated.is_ok());
        assert!(!store.get("a").unwrap().enabled);
    }
}
