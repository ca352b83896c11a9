//! Persisted rule storage.
//!
//! Rules live in a versioned JSON file. Saves are atomic (write to a temp
//! file, then rename) so a crash mid-save never leaves a corrupt store.
//! A missing file loads as an empty set; a corrupt file is an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::RuleSet;

/// Rules file format version.
const STORE_VERSION: u32 = 1;

/// Errors from the rule store.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read rules file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write rules file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse rules file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no config directory available on this platform")]
    NoConfigDir,
}

/// On-disk rules file format.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRules {
    version: u32,
    rules: RuleSet,
}

/// Rule persistence manager.
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    /// Create a store backed by the given file.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Create a store at the platform default location.
    pub fn at_default_path() -> Result<Self, RulesError> {
        Ok(Self::new(Self::default_path()?))
    }

    /// Platform default rules file (`<config dir>/tcprelay/rules.json`).
    pub fn default_path() -> Result<PathBuf, RulesError> {
        let dirs = ProjectDirs::from("", "", "tcprelay").ok_or(RulesError::NoConfigDir)?;
        Ok(dirs.config_dir().join("rules.json"))
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the rule set from disk.
    ///
    /// Returns an empty set if the file doesn't exist or carries an
    /// unknown format version. A file that exists but fails to parse is
    /// an error.
    pub fn load(&self) -> Result<RuleSet, RulesError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No rules file, starting empty");
            return Ok(RuleSet::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| RulesError::Read {
            path: self.path.clone(),
            source,
        })?;

        let stored: StoredRules =
            serde_json::from_str(&content).map_err(|source| RulesError::Parse {
                path: self.path.clone(),
                source,
            })?;

        if stored.version != STORE_VERSION {
            warn!(
                file_version = stored.version,
                current_version = STORE_VERSION,
                "Rules file version mismatch, starting empty"
            );
            return Ok(RuleSet::default());
        }

        info!(
            path = %self.path.display(),
            rule_count = stored.rules.len(),
            "Loaded rules"
        );

        Ok(stored.rules)
    }

    /// Save the rule set to disk atomically.
    pub fn save(&self, rules: &RuleSet) -> Result<(), RulesError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RulesError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let stored = StoredRules {
            version: STORE_VERSION,
            rules: rules.clone(),
        };
        let content = serde_json::to_string_pretty(&stored).map_err(|source| RulesError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &content).map_err(|source| RulesError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        fs::rename(&tmp_path, &self.path).map_err(|source| RulesError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            rule_count = rules.len(),
            "Saved rules"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rule;
    use std::env::temp_dir;

    fn test_path(name: &str) -> PathBuf {
        temp_dir().join(format!("tcprelay-{}-{}.json", name, std::process::id()))
    }

    fn sample_rules() -> RuleSet {
        RuleSet::new(vec![Rule {
            id: 1,
            bind_address: "0.0.0.0".to_string(),
            listen_port: 2222,
            dest_address: "127.0.0.1".to_string(),
            dest_port: 2200,
        }])
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = RuleStore::new(test_path("missing"));
        let rules = store.load().unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = test_path("roundtrip");
        let store = RuleStore::new(path.clone());

        let rules = sample_rules();
        store.save(&rules).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, rules);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let path = test_path("corrupt");
        fs::write(&path, "not json{").unwrap();

        let store = RuleStore::new(path.clone());
        match store.load() {
            Err(RulesError::Parse { .. }) => {}
            other => panic!("Expected Parse error, got {:?}", other.map(|r| r.len())),
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_version_mismatch_starts_empty() {
        let path = test_path("version");
        fs::write(&path, r#"{"version": 99, "rules": []}"#).unwrap();

        let store = RuleStore::new(path.clone());
        let rules = store.load().unwrap();
        assert!(rules.is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = temp_dir().join(format!("tcprelay-nested-{}", std::process::id()));
        let path = dir.join("deep").join("rules.json");

        let store = RuleStore::new(path.clone());
        store.save(&sample_rules()).unwrap();
        assert!(path.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
