//! Bridge configuration with environment variable priority
//!
//! Configuration is resolved in this order (first found wins):
//! 1. Environment variables (STANDIN_*, then the legacy ASYNC_TEST_TIMEOUT)
//! 2. Config file (standin.toml)
//! 3. Default values

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Environment variable prefix
const ENV_PREFIX: &str = "STANDIN";

/// Timeout variable honoured for compatibility with older test suites
const LEGACY_TIMEOUT_VAR: &str = "ASYNC_TEST_TIMEOUT";

/// Seconds a bridged request may take before it is failed
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Bridge settings as parsed from TOML, before environment overrides
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BridgeSettings {
    /// Request timeout in seconds (fractions allowed)
    pub request_timeout: Option<f64>,

    /// Address the application under test is bound to
    pub bind_host: Option<IpAddr>,
}

/// Resolved bridge configuration
#[derive(Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    pub request_timeout: Duration,
    pub bind_host: IpAddr,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl BridgeConfig {
    /// Defaults with environment variable overrides
    pub fn from_env() -> Self {
        BridgeSettings::default().resolve()
    }

    /// Load a config file and resolve with environment variable overrides
    pub fn load(path: impl AsRef<Path>) -> Self {
        BridgeSettings::load(path).resolve()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }
}

impl BridgeSettings {
    /// Load settings from a TOML file (optional)
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        tracing::info!("Loaded bridge config from {}", path.display());
                        return settings;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Resolve against the process environment
    pub fn resolve(self) -> BridgeConfig {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Resolve against an arbitrary variable lookup
    pub fn resolve_with<F>(self, lookup: F) -> BridgeConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BridgeConfig::default();
        let prefixed = |name: &str| lookup(&format!("{}_{}", ENV_PREFIX, name));

        // Timeout: STANDIN_REQUEST_TIMEOUT > ASYNC_TEST_TIMEOUT > config > default
        let request_timeout = prefixed("REQUEST_TIMEOUT")
            .and_then(|v| parse_seconds("STANDIN_REQUEST_TIMEOUT", &v))
            .or_else(|| {
                lookup(LEGACY_TIMEOUT_VAR).and_then(|v| parse_seconds(LEGACY_TIMEOUT_VAR, &v))
            })
            .or_else(|| {
                self.request_timeout
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            })
            .unwrap_or(defaults.request_timeout);

        // Bind host: STANDIN_BIND_HOST > config > loopback
        let bind_host = prefixed("BIND_HOST")
            .and_then(|v| match v.trim().parse() {
                Ok(host) => Some(host),
                Err(e) => {
                    tracing::warn!("Ignoring STANDIN_BIND_HOST={:?}: {}", v, e);
                    None
                }
            })
            .or(self.bind_host)
            .unwrap_or(defaults.bind_host);

        BridgeConfig {
            request_timeout,
            bind_host,
        }
    }
}

fn parse_seconds(name: &str, value: &str) -> Option<Duration> {
    match value.trim().parse::<f64>() {
        Ok(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(timeout) => Some(timeout),
            Err(e) => {
                tracing::warn!("Ignoring {}={:?}: {}", name, value, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", name, value, e);
            None
        }
    }
}
