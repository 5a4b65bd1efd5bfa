//! Run configuration.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. `.auditharvesterrc` (JSON) in the project directory, or an explicit file
//! 3. Environment variables (`AUDIT_HARVESTER_*`, `npm_config_registry`)
//! 4. CLI flags (applied by the binary)

use crate::harvest::MergePolicy;
use crate::registry::DEFAULT_REGISTRY_URL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const RC_FILE_NAME: &str = ".auditharvesterrc";

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const MAX_CONCURRENCY: usize = 64;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarvestConfig {
    pub registry_url: String,
    pub concurrency: usize,
    pub lookup_timeout_secs: Option<u64>,
    pub merge_policy: MergePolicy,
    pub fetch_latest: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            lookup_timeout_secs: None,
            merge_policy: MergePolicy::FirstSeen,
            fetch_latest: false,
        }
    }
}

impl HarvestConfig {
    /// Loads defaults, then the explicit file or the project rc file, then env.
    ///
    /// A missing rc file is not an error; an explicit file that is missing is.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(project_dir, explicit, |key| std::env::var(key).ok())
    }

    /// [`HarvestConfig::load`] with environment variables read through `lookup`.
    pub fn load_with_env<F>(
        project_dir: &Path,
        explicit: Option<&Path>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let rc = project_dir.join(RC_FILE_NAME);
                if rc.is_file() {
                    Self::from_file(&rc)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(lookup);
        config.concurrency = config.concurrency.clamp(1, MAX_CONCURRENCY);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Reading config file");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // npm's own variable first so the tool-specific one can override it
        for key in ["npm_config_registry", "AUDIT_HARVESTER_REGISTRY"] {
            if let Some(url) = lookup(key).filter(|v| !v.trim().is_empty()) {
                self.registry_url = url.trim().to_string();
            }
        }

        if let Some(raw) = lookup("AUDIT_HARVESTER_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.concurrency = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid AUDIT_HARVESTER_CONCURRENCY"),
            }
        }

        if let Some(raw) = lookup("AUDIT_HARVESTER_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.lookup_timeout_secs = Some(secs),
                Err(_) => warn!(value = %raw, "Ignoring invalid AUDIT_HARVESTER_TIMEOUT_SECS"),
            }
        }
    }

    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.lookup_timeout_secs.map(Duration::from_secs)
    }
}
