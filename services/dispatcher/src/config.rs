//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Access tokens never appear in the TOML; they live in the account state
//! file, which accounts are added to at runtime through the API.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use social_accounts::Platform;
use social_pool::RotationStrategy;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub storage: StorageConfig,
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Pools to ensure exist at startup. Pools created through the API are
    /// persisted and survive restarts without an entry here.
    #[serde(default)]
    pub pools: Vec<PoolSeed>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Dispatch loop settings
#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            publish_timeout_secs: default_publish_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// State file locations
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub accounts_path: PathBuf,
    pub pools_path: PathBuf,
    /// JSON-lines audit log of publish attempts; omit to disable.
    #[serde(default)]
    pub audit_path: Option<PathBuf>,
}

/// Platform adapter endpoints
#[derive(Debug, Deserialize)]
pub struct PublisherConfig {
    /// platform name → adapter base URL
    pub adapter_urls: HashMap<Platform, String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Health policy knobs; all optional, defaults match the engine's.
#[derive(Debug, Default, Deserialize)]
pub struct PolicyConfig {
    pub cooldown_secs: Option<u64>,
    pub max_cooldown_secs: Option<u64>,
    pub suspend_after_auth_failures: Option<u32>,
    pub cooldown_after_transient_failures: Option<u32>,
}

/// A pool declared in config, created on startup if absent.
#[derive(Debug, Deserialize)]
pub struct PoolSeed {
    pub brand_id: String,
    pub platform: Platform,
    #[serde(default)]
    pub strategy: RotationStrategy,
    pub max_posts_per_day: Option<u32>,
    pub cooldown_secs: Option<u64>,
    /// Account ids to enroll as members, in priority order.
    #[serde(default)]
    pub accounts: Vec<String>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_publish_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.dispatch.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if config.dispatch.publish_timeout_secs == 0 {
            return Err(common::Error::Config(
                "publish_timeout_secs must be greater than 0".into(),
            ));
        }
        if config.publisher.adapter_urls.is_empty() {
            return Err(common::Error::Config(
                "at least one adapter_urls entry is required".into(),
            ));
        }
        for (platform, url) in &config.publisher.adapter_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "adapter url for {platform} must start with http:// or https://, got: {url}"
                )));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("social-dispatcher.toml")
    }
}
