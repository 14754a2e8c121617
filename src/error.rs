use std::time::Duration;

use thiserror::Error;

/// Failure of a single outbound probe request.
///
/// Probes absorb these: a failed candidate path just means "no signal here".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request to {url} timed out after {}ms", .timeout.as_millis())]
    Timeout { url: String, timeout: Duration },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

impl ProbeError {
    pub(crate) fn from_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            ProbeError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("timeout_ms must be greater than zero")]
    ZeroTimeout,
    #[error("user_agent must not be empty")]
    EmptyUserAgent,
    #[error("max_concurrent_probes must be at least 1")]
    ZeroConcurrency,
    #[error("max_concurrent_probes is {value}, the limit is {max}")]
    ConcurrencyTooHigh { value: usize, max: usize },
    #[error("at least one protocol must be configured")]
    NoProtocols,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown protocol: {0}")]
pub struct ParseProtocolError(pub(crate) String);
