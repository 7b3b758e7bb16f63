//! Rate limit policies and the named preset table.
//!
//! A policy is a plain `{limit, windowSeconds}` pair. The gateway is
//! policy-agnostic; integrators bind a policy (usually one of the presets
//! below) to each route group.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::error::{GatekeeperError, Result};

/// Longest accepted window: one year.
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Maximum requests per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPolicy")]
pub struct RateLimitPolicy {
    limit: u64,
    window_seconds: u64,
}

/// General API traffic.
pub const STANDARD: RateLimitPolicy = RateLimitPolicy::preset(100, 60);
/// Sign-in, sign-up and other credential endpoints.
pub const AUTH: RateLimitPolicy = RateLimitPolicy::preset(5, 60);
/// Endpoints with heavy server-side work.
pub const EXPENSIVE: RateLimitPolicy = RateLimitPolicy::preset(10, 60);
/// File uploads.
pub const UPLOAD: RateLimitPolicy = RateLimitPolicy::preset(20, 3600);
/// Search queries.
pub const SEARCH: RateLimitPolicy = RateLimitPolicy::preset(30, 60);

impl RateLimitPolicy {
    /// Create a policy, rejecting a zero limit or a window outside
    /// `1..=MAX_WINDOW_SECONDS`.
    pub fn new(limit: u64, window_seconds: u64) -> Result<Self> {
        if limit == 0 {
            return Err(GatekeeperError::InvalidPolicy(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(GatekeeperError::InvalidPolicy(
                "windowSeconds must be greater than zero".to_string(),
            ));
        }
        if window_seconds > MAX_WINDOW_SECONDS {
            return Err(GatekeeperError::InvalidPolicy(format!(
                "windowSeconds must be at most {}",
                MAX_WINDOW_SECONDS
            )));
        }
        Ok(Self {
            limit,
            window_seconds,
        })
    }

    const fn preset(limit: u64, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds,
        }
    }

    /// Requests allowed per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_seconds.saturating_mul(1000)
    }
}

#[derive(Deserialize)]
struct RawPolicy {
    limit: u64,
    #[serde(alias = "window_seconds")]
    #[serde(rename = "windowSeconds")]
    window_seconds: u64,
}

impl TryFrom<RawPolicy> for RateLimitPolicy {
    type Error = GatekeeperError;

    fn try_from(raw: RawPolicy) -> Result<Self> {
        RateLimitPolicy::new(raw.limit, raw.window_seconds)
    }
}

/// Named policies, seeded with the built-in presets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    policies: BTreeMap<String, RateLimitPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let policies = [
            ("standard", STANDARD),
            ("auth", AUTH),
            ("expensive", EXPENSIVE),
            ("upload", UPLOAD),
            ("search", SEARCH),
        ]
        .into_iter()
        .map(|(name, policy)| (name.to_string(), policy))
        .collect();

        Self { policies }
    }
}

impl PolicyTable {
    /// The built-in presets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<RateLimitPolicy> {
        self.policies.get(name).copied()
    }

    /// Add or replace a named policy.
    pub fn insert(&mut self, name: impl Into<String>, policy: RateLimitPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Overlay `overrides` on top of this table.
    pub fn merge(&mut self, overrides: &BTreeMap<String, RateLimitPolicy>) {
        for (name, policy) in overrides {
            self.insert(name.clone(), *policy);
        }
    }

    /// Iterate over `(name, policy)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, RateLimitPolicy)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Load a table from a YAML file, layered over the presets.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a YAML mapping of `name -> {limit, windowSeconds}`, layered over the presets.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: BTreeMap<String, RateLimitPolicy> = serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse policies: {}", e)))?;

        let mut table = Self::new();
        table.merge(&overrides);
        Ok(table)
    }
}
