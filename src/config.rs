use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::http::dispatcher::DispatcherSettings;

/// Server configuration.
///
/// Every field has a default. `KEEL_CONFIG` may name a YAML file to read
/// fields from, and `LISTEN` overrides the listen address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Worker threads, each with its own dispatcher.
    pub workers: usize,
    /// Largest request body accepted, in bytes.
    pub max_body_size: usize,
    /// Interval between idle dispatcher passes.
    pub tick_ms: u64,
    pub server_name: String,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            workers: 1,
            max_body_size: 1024 * 1024,
            tick_ms: 10,
            server_name: "keel".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("KEEL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.tick_ms == 0 {
            anyhow::bail!("tick_ms must be at least 1");
        }
        if self.server_name.is_empty() || self.server_name.contains(['\r', '\n']) {
            anyhow::bail!("server_name must be a non-empty single line");
        }
        Ok(())
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            max_body_size: self.max_body_size,
            server_name: self.server_name.clone(),
        }
    }
}
