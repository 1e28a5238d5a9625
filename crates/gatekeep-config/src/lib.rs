//! # Gatekeep Config - Configuration Management
//!
//! Layered configuration: serde defaults, then an optional YAML file, then
//! `GATEKEEP_*` environment variables (e.g. `GATEKEEP_SERVER__PORT=9000`).

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request deadline in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            worker_threads: default_worker_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory", or "scylla" when built with the scylla feature
    #[serde(default = "default_store_backend")]
    pub backend: String,

    #[serde(default = "default_store_host")]
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    #[serde(default = "default_keyspace")]
    pub keyspace: String,
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    9042
}

fn default_keyspace() -> String {
    "gatekeep".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            host: default_store_host(),
            port: default_store_port(),
            keyspace: default_keyspace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// "memory" or "redis"
    #[serde(default = "default_cache_backend")]
    pub backend: String,

    #[serde(default = "default_cache_host")]
    pub host: String,

    #[serde(default = "default_cache_port")]
    pub port: u16,

    #[serde(default = "default_cache_max_capacity")]
    pub max_capacity: u64,

    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_backend() -> String {
    "memory".to_string()
}

fn default_cache_host() -> String {
    "localhost".to_string()
}

fn default_cache_port() -> u16 {
    6379
}

fn default_cache_max_capacity() -> u64 {
    10_000
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            backend: default_cache_backend(),
            host: default_cache_host(),
            port: default_cache_port(),
            max_capacity: default_cache_max_capacity(),
            ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Evaluation depth bound; exceeding it denies
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Concurrent direct probes per evaluation frontier
    #[serde(default = "default_probe_parallelism")]
    pub probe_parallelism: usize,

    /// Concurrent checks dispatched by BatchCheck
    #[serde(default = "default_batch_parallelism")]
    pub batch_parallelism: usize,
}

fn default_max_depth() -> usize {
    16
}

fn default_probe_parallelism() -> usize {
    10
}

fn default_batch_parallelism() -> usize {
    16
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            probe_parallelism: default_probe_parallelism(),
            batch_parallelism: default_batch_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

/// Load configuration from an optional file plus the environment.
pub fn load(path: &str) -> Result<Config, ConfigError> {
    ConfigBuilder::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::with_prefix("GATEKEEP").separator("__"))
        .build()?
        .try_deserialize()
}

/// Load configuration, falling back to defaults when the file or the
/// environment cannot be parsed.
pub fn load_or_default(path: &str) -> Config {
    match load(path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load configuration, using defaults");
            Config::default()
        },
    }
}
