//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars, and exposes the typed `[indexer]` section. Paths expand
//! `~` and `${VAR}` and resolve against the directory the config was read from.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Merges `config.toml`, `config.<env>.toml` and `APP_*` variables found
    /// relative to `dir`. Nested keys use `__`, e.g. `APP_INDEXER__QUEUE_TYPE`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Self::defaults().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        tracing::debug!(env = %env_name, dir = %dir.display(), "loaded configuration");

        Ok(Self { figment, base_dir: dir.to_path_buf() })
    }

    /// Builds a configuration from an inline TOML document on top of the defaults.
    pub fn from_toml(toml: &str, base_dir: &Path) -> Self {
        let figment = Self::defaults().merge(Toml::string(toml));
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    fn defaults() -> Figment {
        Figment::from(Serialized::default("indexer", IndexerSettings::default()))
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    /// The validated `[indexer]` section. Unknown backend names fail here.
    pub fn indexer(&self) -> Result<IndexerSettings> {
        let settings: IndexerSettings = self.get("indexer")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_dir(&self) -> &Path { &self.base_dir }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerKind {
    #[serde(alias = "bleve")]
    Tantivy,
    Db,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Channel,
    #[serde(alias = "levelqueue")]
    Disk,
    Redis,
}

/// Issue indexer options, read from the `[indexer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    pub issue_type: IndexerKind,
    pub issue_path: String,
    pub queue_type: QueueKind,
    pub queue_dir: String,
    pub queue_conn_str: String,
    pub batch_number: usize,
    pub queue_length: usize,
    pub flush_interval_ms: u64,
    pub push_timeout_ms: u64,
    pub sync_populate: bool,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            issue_type: IndexerKind::Tantivy,
            issue_path: "indexers/issues.index".to_string(),
            queue_type: QueueKind::Channel,
            queue_dir: "indexers/issues.queue".to_string(),
            queue_conn_str: "addrs=127.0.0.1:6379 db=0".to_string(),
            batch_number: 20,
            queue_length: 1000,
            flush_interval_ms: 300,
            push_timeout_ms: 5000,
            sync_populate: false,
        }
    }
}

impl IndexerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_number == 0 {
            return Err(Error::InvalidConfig("indexer.batch_number must be at least 1".to_string()));
        }
        if self.queue_length == 0 {
            return Err(Error::InvalidConfig("indexer.queue_length must be at least 1".to_string()));
        }
        if self.issue_type == IndexerKind::Tantivy && self.issue_path.trim().is_empty() {
            return Err(Error::InvalidConfig("indexer.issue_path is required for the tantivy indexer".to_string()));
        }
        match self.queue_type {
            QueueKind::Disk if self.queue_dir.trim().is_empty() => {
                Err(Error::InvalidConfig("indexer.queue_dir is required for the disk queue".to_string()))
            }
            QueueKind::Redis if self.queue_conn_str.trim().is_empty() => {
                Err(Error::InvalidConfig("indexer.queue_conn_str is required for the redis queue".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn issue_path(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.issue_path) }

    pub fn queue_dir(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.queue_dir) }

    pub fn flush_interval(&self) -> Duration { Duration::from_millis(self.flush_interval_ms) }

    pub fn push_timeout(&self) -> Duration { Duration::from_millis(self.push_timeout_ms) }
}

/// Expands `~` and `$VAR`/`${VAR}` in a configured path. A reference to an
/// unset variable leaves the variables as written; `~` is still expanded.
pub fn expand_path(raw: impl AsRef<str>) -> PathBuf {
    let raw = raw.as_ref();
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(e) => {
            tracing::warn!(path = raw, error = %e, "path references an unset variable");
            PathBuf::from(shellexpand::tilde(raw).into_owned())
        }
    }
}

/// [`expand_path`], then joined onto `base` unless already absolute.
pub fn resolve_with_base(base: &Path, raw: impl AsRef<str>) -> PathBuf {
    let path = expand_path(raw);
    if path.is_absolute() {
        return path;
    }
    base.join(path)
}
