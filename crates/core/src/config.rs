use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process configuration for repository clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Queue namespace; also the default queue name on dispatched messages
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Record TTL in seconds applied by the expire operations when no
    /// explicit ttl is given. Absent means records never expire.
    #[serde(default)]
    pub ttl: Option<u64>,

    /// Path of the embedded store file, for deployments using it
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_namespace() -> String {
    "gantry".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("gantry.redb")
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            ttl: None,
            store_path: default_store_path(),
        }
    }
}

impl Configuration {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    pub fn ttl_duration(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }
}
