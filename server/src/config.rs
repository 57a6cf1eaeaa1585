//! Server configuration.
//!
//! Loaded from a TOML file; every section and field has a default, so an
//! absent file means "run with defaults". The `RUST_LOG` environment variable
//! overrides the configured log level (see [`crate::logging`]).

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Cache tier sizing
    #[serde(default)]
    pub cache: CacheConfig,

    /// Disk tier configuration
    #[serde(default)]
    pub disk: DiskConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_address")]
    pub address: SocketAddr,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Per-connection input buffer cap (e.g., "513MB"). A connection whose
    /// pending request bytes exceed this is dropped.
    #[serde(
        default = "default_max_request_size",
        deserialize_with = "deserialize_size"
    )]
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            backlog: default_backlog(),
            max_request_size: default_max_request_size(),
        }
    }
}

/// Cache tier sizing.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Entry capacity of the hot tier
    #[serde(default = "default_hot_capacity")]
    pub hot_capacity: usize,

    /// Entry capacity of the warm tier
    #[serde(default = "default_warm_capacity")]
    pub warm_capacity: usize,

    /// Accesses after which a warm entry promotes to hot
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_capacity: default_hot_capacity(),
            warm_capacity: default_warm_capacity(),
            promotion_threshold: default_promotion_threshold(),
        }
    }
}

/// Disk tier configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    /// Root directory for demoted values and the index file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include the event target
    #[serde(default)]
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: false,
        }
    }
}

// Default value functions

fn default_address() -> SocketAddr {
    "0.0.0.0:9001".parse().unwrap()
}

fn default_backlog() -> u32 {
    10_000
}

fn default_max_request_size() -> usize {
    // Room for one maximum-size value plus framing overhead.
    513 * 1024 * 1024
}

fn default_hot_capacity() -> usize {
    10_000
}

fn default_warm_capacity() -> usize {
    50_000
}

fn default_promotion_threshold() -> u32 {
    3
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./blinkdb_data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Deserialize a size string like "64MB" or "4GB" into bytes.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Number(usize),
        String(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Number(n) => Ok(n),
        SizeValue::String(s) => parse_size(&s).map_err(D::Error::custom),
    }
}

/// Parse a size string like "64MB", "4GB", "1TB" into bytes.
pub fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&s[..idx], s[idx..].to_uppercase()),
        None => (s, String::new()),
    };

    let num: usize = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier: usize = match suffix.as_str() {
        "" => 1,
        "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(format!("unknown size suffix: {}", suffix)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size overflow".to_string())
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.cache.hot_capacity == 0 {
            return Err("hot_capacity must be at least 1".into());
        }
        if self.cache.warm_capacity == 0 {
            return Err("warm_capacity must be at least 1".into());
        }
        if self.cache.promotion_threshold == 0 {
            return Err("promotion_threshold must be at least 1".into());
        }
        if self.server.backlog == 0 {
            return Err("backlog must be at least 1".into());
        }
        if self.server.max_request_size < 4096 {
            return Err("max_request_size must be at least 4096".into());
        }
        Ok(())
    }
}
