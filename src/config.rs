use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const CONFIG_FILE: &str = "confirmly.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::File,
            data_dir: PathBuf::from("/tmp/confirmation-data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    /// Origin generated links point at when the request does not name one.
    pub base_url: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        LinksConfig {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig { timeout_secs: 10 }
    }
}

/// Runtime switches between the full workflow and the plain
/// token-only flow (no tracking id, no notifications).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Features {
    pub tracking: bool,
    pub webhooks: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features {
            tracking: true,
            webhooks: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub links: LinksConfig,
    pub webhook: WebhookConfig,
    pub features: Features,
}

impl AppConfig {
    /// Read `confirmly.toml` from the working directory.
    pub fn load() -> Self {
        Self::load_from(CONFIG_FILE)
    }

    /// Missing or invalid files fall back to defaults with a warning.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                log::warn!("{} not found — using default config", path.display());
                return Self::default();
            }
        };
        match toml::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("{} is invalid ({}) — using default config", path.display(), e);
                Self::default()
            }
        }
    }
}
