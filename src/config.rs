//! Configuration management for the throttler.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ThrottleError};
use crate::throttle::ThrottlingPolicy;

/// Throttling configuration.
///
/// This is the raw, user-facing form. It is validated and compiled into a
/// [`ThrottlingPolicy`] before a throttler is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Number of requests admitted per `unit_of_time`
    #[serde(default = "default_requests_per_unit")]
    pub requests_per_unit: u32,

    /// The time unit the request count refers to
    #[serde(default = "default_unit_of_time", with = "humantime_serde")]
    pub unit_of_time: Duration,

    /// HTTP methods subject to throttling (empty means all methods)
    #[serde(default)]
    pub http_methods: Vec<String>,

    /// Path prefixes subject to throttling (empty means all paths)
    #[serde(default)]
    pub include_prefixes: Vec<String>,

    /// Path prefixes never throttled (empty means none)
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,

    /// Whether requests may wait for a slot instead of being rejected
    #[serde(default = "default_allow_overqueue")]
    pub allow_overqueue: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            requests_per_unit: default_requests_per_unit(),
            unit_of_time: default_unit_of_time(),
            http_methods: Vec::new(),
            include_prefixes: Vec::new(),
            exclude_prefixes: Vec::new(),
            allow_overqueue: default_allow_overqueue(),
        }
    }
}

fn default_requests_per_unit() -> u32 {
    1
}

fn default_unit_of_time() -> Duration {
    Duration::from_secs(1)
}

fn default_allow_overqueue() -> bool {
    true
}

impl ThrottleConfig {
    /// Create a configuration admitting `requests_per_unit` requests every
    /// `unit_of_time`, applying to every path and method.
    pub fn new(requests_per_unit: u32, unit_of_time: Duration) -> Self {
        Self {
            requests_per_unit,
            unit_of_time,
            ..Self::default()
        }
    }

    /// Restrict throttling to the given HTTP methods.
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.http_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict throttling to paths starting with one of these patterns.
    pub fn with_include_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Never throttle paths starting with one of these patterns.
    pub fn with_exclude_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set whether requests may wait for a slot.
    pub fn with_allow_overqueue(mut self, allow_overqueue: bool) -> Self {
        self.allow_overqueue = allow_overqueue;
        self
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttling configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttling config: {}", e)))
    }

    /// Check the numeric settings.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_unit == 0 {
            return Err(ThrottleError::Config(
                "requests_per_unit must be positive".to_string(),
            ));
        }
        if self.unit_of_time.is_zero() {
            return Err(ThrottleError::Config(
                "unit_of_time must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate and compile into an immutable policy.
    pub fn into_policy(&self) -> Result<ThrottlingPolicy> {
        ThrottlingPolicy::new(self)
    }
}
