//! Scan configuration.
//!
//! A [`ScanConfig`] is built once at process start (from the environment, a
//! deserialized document or CLI flags) and handed to every scan by reference.
//! Probe code never reads the environment itself.

use std::env;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Protocol;

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_USER_AGENT: &str = "SlyScanner/1.0 (+https://sly.dev/scanner)";
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 200;
pub const DEFAULT_MAX_REQUESTS_PER_DOMAIN: u32 = 5;
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 8;
/// Upper bound for `max_concurrent_probes`, shared by every scan on one limiter.
pub const MAX_CONCURRENT_PROBES: usize = 4_096;

/// Slack added on top of `timeout_ms` before the per-probe guard gives up.
pub const GUARD_SLACK_MS: u64 = 1_000;

pub const ENV_TIMEOUT_MS: &str = "SCANNER_TIMEOUT_MS";
pub const ENV_USER_AGENT: &str = "SCANNER_USER_AGENT";
pub const ENV_RATE_LIMIT_DELAY_MS: &str = "SCANNER_RATE_LIMIT_DELAY_MS";
pub const ENV_MAX_REQUESTS_PER_DOMAIN: &str = "SCANNER_MAX_REQUESTS_PER_DOMAIN";
pub const ENV_MAX_CONCURRENT_PROBES: &str = "SCANNER_MAX_CONCURRENT_PROBES";
pub const ENV_PROTOCOLS: &str = "SCANNER_PROTOCOLS";

/// URL scheme used when building probe URLs.
///
/// Real scans always use HTTPS; plain HTTP is for local fixture servers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Https,
    Http,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Deadline applied to every outbound HTTP request.
    #[serde(default = "config_defaults::timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "config_defaults::user_agent")]
    pub user_agent: String,
    /// Advisory: consumed by whoever schedules scans, not by the probes.
    #[serde(default = "config_defaults::rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    /// Advisory: consumed by whoever schedules scans, not by the probes.
    #[serde(default = "config_defaults::max_requests_per_domain")]
    pub max_requests_per_domain: u32,
    #[serde(default = "config_defaults::max_concurrent_probes")]
    pub max_concurrent_probes: usize,
    #[serde(default = "config_defaults::protocols")]
    pub protocols: Vec<Protocol>,
    #[serde(default)]
    pub scheme: Scheme,
}

mod config_defaults {
    use super::*;

    pub fn timeout_ms() -> u64 {
        DEFAULT_TIMEOUT_MS
    }

    pub fn user_agent() -> String {
        DEFAULT_USER_AGENT.to_string()
    }

    pub fn rate_limit_delay_ms() -> u64 {
        DEFAULT_RATE_LIMIT_DELAY_MS
    }

    pub fn max_requests_per_domain() -> u32 {
        DEFAULT_MAX_REQUESTS_PER_DOMAIN
    }

    pub fn max_concurrent_probes() -> usize {
        DEFAULT_MAX_CONCURRENT_PROBES
    }

    pub fn protocols() -> Vec<Protocol> {
        Protocol::ALL.to_vec()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_ms: config_defaults::timeout_ms(),
            user_agent: config_defaults::user_agent(),
            rate_limit_delay_ms: config_defaults::rate_limit_delay_ms(),
            max_requests_per_domain: config_defaults::max_requests_per_domain(),
            max_concurrent_probes: config_defaults::max_concurrent_probes(),
            protocols: config_defaults::protocols(),
            scheme: Scheme::default(),
        }
    }
}

impl ScanConfig {
    /// Load from `SCANNER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset or blank keys take the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_number(ENV_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = get(ENV_USER_AGENT) {
            config.user_agent = v;
        }
        if let Some(v) = get(ENV_RATE_LIMIT_DELAY_MS) {
            config.rate_limit_delay_ms = parse_number(ENV_RATE_LIMIT_DELAY_MS, &v)?;
        }
        if let Some(v) = get(ENV_MAX_REQUESTS_PER_DOMAIN) {
            config.max_requests_per_domain = parse_number(ENV_MAX_REQUESTS_PER_DOMAIN, &v)?;
        }
        if let Some(v) = get(ENV_MAX_CONCURRENT_PROBES) {
            config.max_concurrent_probes = parse_number(ENV_MAX_CONCURRENT_PROBES, &v)?;
        }
        if let Some(v) = get(ENV_PROTOCOLS) {
            config.protocols = parse_protocols(&v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_concurrent_probes > MAX_CONCURRENT_PROBES {
            return Err(ConfigError::ConcurrencyTooHigh {
                value: self.max_concurrent_probes,
                max: MAX_CONCURRENT_PROBES,
            });
        }
        if self.protocols.is_empty() {
            return Err(ConfigError::NoProtocols);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Deadline for the per-probe guard; looser than the per-request one.
    pub fn guard_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.saturating_add(GUARD_SLACK_MS))
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

fn parse_number<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a comma-separated protocol list, e.g. `"acp, x402,visa-vic"`.
pub fn parse_protocols(value: &str) -> Result<Vec<Protocol>, ConfigError> {
    let mut out = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let protocol = part
            .parse::<Protocol>()
            .map_err(|e| ConfigError::InvalidValue {
                key: ENV_PROTOCOLS,
                value: value.to_string(),
                reason: e.to_string(),
            })?;
        if !out.contains(&protocol) {
            out.push(protocol);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = ScanConfig::default();
        assert_eq!(c.timeout_ms, 5_000);
        assert_eq!(c.user_agent, "SlyScanner/1.0 (+https://sly.dev/scanner)");
        assert_eq!(c.rate_limit_delay_ms, 200);
        assert_eq!(c.max_requests_per_domain, 5);
        assert_eq!(c.max_concurrent_probes, 8);
        assert_eq!(c.protocols, Protocol::ALL.to_vec());
        assert_eq!(c.scheme, Scheme::Https);
        assert_eq!(c.guard_timeout(), Duration::from_millis(6_000));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let c = ScanConfig::from_lookup(lookup_from(&[
            (ENV_TIMEOUT_MS, "10000"),
            (ENV_USER_AGENT, "TestBot/2.0"),
            (ENV_PROTOCOLS, "acp, x402"),
        ]))
        .unwrap();
        assert_eq!(c.timeout_ms, 10_000);
        assert_eq!(c.user_agent, "TestBot/2.0");
        assert_eq!(c.protocols, vec![Protocol::Acp, Protocol::X402]);
        assert_eq!(c.rate_limit_delay_ms, DEFAULT_RATE_LIMIT_DELAY_MS);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let c = ScanConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_MS, "  ")])).unwrap();
        assert_eq!(c.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn invalid_number_is_reported() {
        let err = ScanConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_TIMEOUT_MS, .. }));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = ScanConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_MS, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroTimeout);
    }

    #[test]
    fn concurrency_above_ceiling_rejected() {
        let err = ScanConfig::from_lookup(lookup_from(&[(ENV_MAX_CONCURRENT_PROBES, "1000000")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ConcurrencyTooHigh {
                value: 1_000_000,
                max: MAX_CONCURRENT_PROBES,
            }
        );

        let at_ceiling = ScanConfig {
            max_concurrent_probes: MAX_CONCURRENT_PROBES,
            ..ScanConfig::default()
        };
        assert!(at_ceiling.validate().is_ok());
    }

    #[test]
    fn unknown_protocol_rejected() {
        assert!(parse_protocols("acp,gopher").is_err());
        assert_eq!(parse_protocols("acp,acp,ucp").unwrap(), vec![Protocol::Acp, Protocol::Ucp]);
    }

    #[test]
    fn deserialize_fills_defaults() {
        let c: ScanConfig = serde_json::from_str(r#"{"timeout_ms": 2500, "scheme": "http"}"#).unwrap();
        assert_eq!(c.timeout_ms, 2_500);
        assert_eq!(c.scheme, Scheme::Http);
        assert_eq!(c.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(c.protocols.len(), 8);
    }
}
