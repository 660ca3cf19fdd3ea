use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::record::ServiceRecord;
use crate::registry::EvictionPolicy;

pub const CONFIG_FILENAME: &str = "injector.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: String,
    /// Identifiers invoked by `POST /`.
    pub targets: Vec<String>,
    /// Base URL of a remote injector to use as the registry. Empty means in-memory.
    pub registry_url: String,
    pub registry_timeout_ms: u64,
    /// 0 disables the outbound request timeout.
    pub forward_timeout_ms: u64,
    pub log_format: LogFormat,
    pub cache: CacheConfig,
    /// Records loaded into the in-memory registry at startup.
    pub services: Vec<ServiceRecord>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".to_string(),
            targets: vec!["hello".to_string()],
            registry_url: String::new(),
            registry_timeout_ms: 5000,
            forward_timeout_ms: 0,
            log_format: LogFormat::Pretty,
            cache: CacheConfig::default(),
            services: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicyKind {
    #[default]
    Unbounded,
    MaxEntries,
    Ttl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub policy: CachePolicyKind,
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicyKind::Unbounded,
            max_entries: 1024,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn eviction_policy(&self) -> EvictionPolicy {
        match self.policy {
            CachePolicyKind::Unbounded => EvictionPolicy::Unbounded,
            CachePolicyKind::MaxEntries => EvictionPolicy::MaxEntries(self.max_entries),
            CachePolicyKind::Ttl => EvictionPolicy::Ttl(Duration::from_secs(self.ttl_secs)),
        }
    }
}

impl Config {
    /// Load from `explicit`, else `./injector.toml`, else the user config dir.
    /// Falls back to defaults when no file exists and none was requested.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return load_config_from_path(path);
        }
        match default_config_path() {
            Some(path) => load_config_from_path(path),
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("targets must list at least one service identifier");
        }
        if let Some(empty) = self.targets.iter().find(|t| t.trim().is_empty()) {
            bail!("targets contains an empty identifier: {:?}", empty);
        }
        if self.cache.policy == CachePolicyKind::Ttl && self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be greater than zero for the ttl policy");
        }
        if !self.registry_url.is_empty()
            && !(self.registry_url.starts_with("http://")
                || self.registry_url.starts_with("https://"))
        {
            bail!(
                "registry_url '{}' must start with http:// or https://",
                self.registry_url
            );
        }
        for record in &self.services {
            record
                .validate()
                .with_context(|| format!("invalid [[services]] entry '{}'", record.id))?;
        }
        Ok(())
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn forward_timeout(&self) -> Option<Duration> {
        (self.forward_timeout_ms > 0).then(|| Duration::from_millis(self.forward_timeout_ms))
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.as_ref().display()))?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("injector").join("config.toml"))
        .filter(|path| path.exists())
}
