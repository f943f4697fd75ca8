//! Configuration for evalgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{GateError, GateResult};

/// Main configuration for evalgate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission limiter settings.
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// External evaluator settings.
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address of the public evaluation endpoint.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Address of the Prometheus endpoint, kept off the public listener.
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: String,

    /// Maximum request body size in bytes. Larger bodies get a 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Origins matching this regex receive CORS headers.
    #[serde(default = "default_allowed_origin_pattern")]
    pub allowed_origin_pattern: String,

    /// Reflect every origin (development only).
    #[serde(default)]
    pub skip_cors_check: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_bind: default_metrics_bind(),
            max_body_bytes: default_max_body_bytes(),
            allowed_origin_pattern: default_allowed_origin_pattern(),
            skip_cors_check: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_bind() -> String {
    "0.0.0.0:9102".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_allowed_origin_pattern() -> String {
    r"^https?://(localhost|127\.0\.0\.1)(:\d+)?$".to_string()
}

/// Token bucket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Refill rate in tokens per second.
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,

    /// Bucket capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
        }
    }
}

fn default_rate_per_sec() -> f64 {
    20.0
}

fn default_burst() -> u32 {
    30
}

/// Output post-processing applied to successful evaluations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Pass the evaluator output through untouched.
    #[default]
    Raw,
    /// Convert JSON output to YAML.
    Yaml,
}

/// External evaluator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Command to execute.
    #[serde(default = "default_command")]
    pub command: String,

    /// Extra library search path, passed as `-J <path>`.
    #[serde(default)]
    pub extra_import_path: Option<String>,

    /// Hard deadline for one evaluation (in seconds).
    #[serde(default = "default_evaluator_timeout")]
    pub timeout_secs: u64,

    /// Output post-processing.
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl EvaluatorConfig {
    /// Evaluation deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            extra_import_path: None,
            timeout_secs: default_evaluator_timeout(),
            output_format: OutputFormat::default(),
        }
    }
}

fn default_command() -> String {
    "jsonnet".to_string()
}

fn default_evaluator_timeout() -> u64 {
    5
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cache capacity (number of entries).
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Entry time to live in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Also cache evaluation failures. Timeouts are never cached.
    #[serde(default = "default_true")]
    pub cache_failures: bool,
}

impl CacheConfig {
    /// Entry TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
            cache_failures: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    1000
}

/// Upper bound for `cache.ttl_secs` (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 3600;

fn default_cache_ttl() -> u64 {
    3600 // 1 hour
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> GateResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GateResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates default configuration.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            limiter: LimiterConfig::default(),
            evaluator: EvaluatorConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> GateResult<()> {
        if !(self.limiter.rate_per_sec.is_finite() && self.limiter.rate_per_sec > 0.0) {
            return Err(GateError::config("limiter.rate_per_sec must be > 0"));
        }
        if self.limiter.burst == 0 {
            return Err(GateError::config("limiter.burst must be > 0"));
        }
        if self.cache.capacity == 0 {
            return Err(GateError::config("cache.capacity must be > 0"));
        }
        if self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(GateError::config(format!(
                "cache.ttl_secs must be <= {MAX_CACHE_TTL_SECS}"
            )));
        }
        if self.evaluator.timeout_secs == 0 {
            return Err(GateError::config("evaluator.timeout_secs must be > 0"));
        }
        if self.evaluator.command.trim().is_empty() {
            return Err(GateError::config("evaluator.command must not be empty"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(GateError::config("server.max_body_bytes must be > 0"));
        }
        regex::Regex::new(&self.server.allowed_origin_pattern)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
