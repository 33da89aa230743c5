use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api;
use crate::cache;
use crate::controller;

const DEFAULT_ENV_PREFIX: &str = "YT_SENTIMENT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_results: default_max_results(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    api::DEFAULT_BASE_URL.to_string()
}

fn default_max_results() -> u32 {
    500
}

fn default_timeout() -> Duration {
    api::DEFAULT_TIMEOUT
}

fn default_user_agent() -> String {
    format!("yt-sentiment/{}", crate::VERSION)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> controller::RetryPolicy {
        controller::RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
        }
    }
}

fn default_max_attempts() -> u32 {
    controller::DEFAULT_MAX_ATTEMPTS
}

fn default_backoff_base() -> Duration {
    controller::DEFAULT_BACKOFF_BASE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_probe")]
    pub probe: bool,
    #[serde(default = "default_probe_interval", with = "humantime_serde")]
    pub probe_interval: Duration,
    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe: default_probe(),
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

fn default_probe() -> bool {
    true
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl: default_cache_ttl(),
        }
    }
}

fn default_cache_entries() -> usize {
    cache::DEFAULT_MAX_ENTRIES
}

fn default_cache_ttl() -> Duration {
    cache::DEFAULT_TTL
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        let from_file = read_config_file(path)?;
        cfg = merge_config(cfg, from_file);
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    validate(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

// Absent keys already carry their serde defaults, so numeric values are taken
// as written and left to `validate`. Blank strings fall back to the base.
fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.trim().is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.trim().is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    base.api.max_results = other.api.max_results;
    base.api.timeout = other.api.timeout;

    base.fetch = other.fetch;

    base.network = other.network;
    base.cache = other.cache;

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.max_results" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.api.max_results = parsed;
            }
        }
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "fetch.max_attempts" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.fetch.max_attempts = parsed;
            }
        }
        "fetch.backoff_base" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.fetch.backoff_base = duration;
            }
        }
        "network.probe" => {
            cfg.network.probe = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "network.probe_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.network.probe_interval = duration;
            }
        }
        "network.probe_timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.network.probe_timeout = duration;
            }
        }
        "cache.max_entries" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.cache.max_entries = parsed;
            }
        }
        "cache.ttl" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.cache.ttl = duration;
            }
        }
        _ => {}
    }
}

fn validate(cfg: &Config) -> Result<()> {
    anyhow::ensure!(
        cfg.fetch.max_attempts >= 1,
        "config: fetch.max_attempts must be at least 1"
    );
    anyhow::ensure!(
        cfg.api.max_results >= 1,
        "config: api.max_results must be at least 1"
    );
    anyhow::ensure!(
        !cfg.api.timeout.is_zero(),
        "config: api.timeout must be greater than zero"
    );
    Url::parse(&cfg.api.base_url)
        .with_context(|| format!("config: api.base_url {:?} is not a URL", cfg.api.base_url))?;
    Ok(())
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("yt-sentiment").join("config.yaml"))
}
