use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseProtocolError;

/// Agentic commerce protocols the scanner knows how to fingerprint.
///
/// Variant order is the canonical result order of a scan.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Ucp,
    Acp,
    X402,
    Ap2,
    Mcp,
    Nlweb,
    VisaVic,
    MastercardAgentpay,
}

impl Protocol {
    pub const ALL: [Protocol; 8] = [
        Protocol::Ucp,
        Protocol::Acp,
        Protocol::X402,
        Protocol::Ap2,
        Protocol::Mcp,
        Protocol::Nlweb,
        Protocol::VisaVic,
        Protocol::MastercardAgentpay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ucp => "ucp",
            Protocol::Acp => "acp",
            Protocol::X402 => "x402",
            Protocol::Ap2 => "ap2",
            Protocol::Mcp => "mcp",
            Protocol::Nlweb => "nlweb",
            Protocol::VisaVic => "visa_vic",
            Protocol::MastercardAgentpay => "mastercard_agentpay",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase().replace('-', "_");
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str() == needle)
            .ok_or_else(|| ParseProtocolError(s.to_string()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Confirmed,
    Eligible,
    PlatformEnabled,
    NotDetected,
    NotApplicable,
}

impl ProbeStatus {
    /// Whether this status counts as the protocol being present on the domain.
    pub fn is_detected(&self) -> bool {
        matches!(
            self,
            ProbeStatus::Confirmed | ProbeStatus::Eligible | ProbeStatus::PlatformEnabled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Confirmed => "confirmed",
            ProbeStatus::Eligible => "eligible",
            ProbeStatus::PlatformEnabled => "platform_enabled",
            ProbeStatus::NotDetected => "not_detected",
            ProbeStatus::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// Outcome of probing one protocol on one domain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub protocol: Protocol,
    pub status: ProbeStatus,
    pub confidence: Confidence,
    pub detection_method: Option<String>,
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    pub response_time_ms: Option<u64>,
    pub is_functional: Option<bool>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn new(protocol: Protocol, status: ProbeStatus, confidence: Confidence) -> Self {
        Self {
            protocol,
            status,
            confidence,
            detection_method: None,
            endpoint_url: None,
            capabilities: Map::new(),
            response_time_ms: None,
            is_functional: None,
            error: None,
        }
    }

    /// Clean negative: every candidate was checked and none carried a signal.
    pub fn not_detected(protocol: Protocol) -> Self {
        Self::new(protocol, ProbeStatus::NotDetected, Confidence::High)
    }

    /// The probe could not reach a verdict; `error` says why.
    pub fn failed(protocol: Protocol, error: impl fmt::Display) -> Self {
        Self::new(protocol, ProbeStatus::NotDetected, Confidence::Low).with_error(error)
    }

    pub fn confirmed(protocol: Protocol, confidence: Confidence) -> Self {
        Self::new(protocol, ProbeStatus::Confirmed, confidence)
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.detection_method = Some(method.into());
        self
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn with_functional(mut self, functional: bool) -> Self {
        self.is_functional = Some(functional);
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Serialize a protocol-specific capability struct into the generic map.
    ///
    /// Anything that does not serialize to a JSON object leaves the map empty.
    pub fn with_capabilities<T: Serialize>(mut self, caps: &T) -> Self {
        self.capabilities = match serde_json::to_value(caps) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_capability_map(mut self, map: Map<String, Value>) -> Self {
        self.capabilities = map;
        self
    }

    pub fn is_detected(&self) -> bool {
        self.status.is_detected()
    }
}

/// Per-domain envelope emitted by the command-line driver.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub domain: String,
    pub scanned_at: String,
    pub detected: Vec<Protocol>,
    pub results: Vec<ProbeResult>,
}

impl ScanReport {
    pub fn new(domain: impl Into<String>, scanned_at: String, results: Vec<ProbeResult>) -> Self {
        let detected = results
            .iter()
            .filter(|r| r.is_detected())
            .map(|r| r.protocol)
            .collect();
        Self {
            domain: domain.into(),
            scanned_at,
            detected,
            results,
        }
    }
}
