//! Configuration management for Gatekeeper.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `GATEKEEPER__SECTION__FIELD` environment variables. The binary applies
//! its CLI flags on top.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{PolicyTable, RateLimitPolicy, DEFAULT_TRUSTED_IP_HEADER};

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter backend configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional YAML file of named policies, layered over the presets
    #[serde(default)]
    pub policies_path: Option<String>,

    /// Inline named policies, layered over the presets and `policies_path`
    #[serde(default)]
    pub policies: BTreeMap<String, RateLimitPolicy>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

/// Where counter actors live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In this process
    #[default]
    Local,
    /// In another Gatekeeper reachable at `limiter.remote_url`
    Remote,
}

/// Counter backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Which backend the gateway talks to
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the remote counter service
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Upper bound on the gateway's wait for a decision, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Idle time after which an expired counter is dropped, in seconds
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,

    /// How often idle counters are swept, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            remote_url: None,
            call_timeout_ms: default_call_timeout_ms(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    250
}

fn default_idle_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl LimiterConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Header set by the edge proxy with the real client address
    #[serde(default = "default_trusted_ip_header")]
    pub trusted_ip_header: String,

    /// Named policy protecting the probe route
    #[serde(default = "default_probe_policy")]
    pub probe_policy: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            trusted_ip_header: default_trusted_ip_header(),
            probe_policy: default_probe_policy(),
        }
    }
}

fn default_trusted_ip_header() -> String {
    DEFAULT_TRUSTED_IP_HEADER.to_string()
}

fn default_probe_policy() -> String {
    "standard".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatekeeperConfig {
    /// Load configuration from an optional YAML file and the process environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading environment overrides from `env` when given.
    pub fn load_with_env(
        path: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("GATEKEEPER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: GatekeeperConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.backend == BackendKind::Remote && self.limiter.remote_url.is_none() {
            return Err(GatekeeperError::Config(
                "limiter.remote_url is required when limiter.backend is remote".to_string(),
            ));
        }
        if self.limiter.call_timeout_ms == 0 {
            return Err(GatekeeperError::Config(
                "limiter.call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.limiter.sweep_interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "limiter.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        axum::http::HeaderName::try_from(self.gateway.trusted_ip_header.as_str()).map_err(|e| {
            GatekeeperError::Config(format!(
                "gateway.trusted_ip_header is not a header name: {}",
                e
            ))
        })?;
        Ok(())
    }

    /// Presets, then `policies_path`, then inline `policies`.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        let mut table = match &self.policies_path {
            Some(path) => PolicyTable::from_file(path)?,
            None => PolicyTable::new(),
        };
        table.merge(&self.policies);
        Ok(table)
    }
}
