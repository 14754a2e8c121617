//! Per-protocol detection strategies and the registry that maps each
//! [`Protocol`] to its probe.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ScanConfig;
use crate::error::ProbeError;
use crate::http::{ProbeClient, ProbeResponse, ACCEPT_HTML, ACCEPT_JSON};
use crate::signals;
use crate::types::{Protocol, ProbeResult};
use crate::url;

mod acp;
mod ap2;
mod mastercard;
mod mcp;
mod nlweb;
mod ucp;
mod visa;
mod x402;

pub use acp::AcpProbe;
pub use ap2::Ap2Probe;
pub use mastercard::MastercardProbe;
pub use mcp::McpProbe;
pub use nlweb::NlwebProbe;
pub use ucp::UcpProbe;
pub use visa::VisaVicProbe;
pub use x402::X402Probe;

/// Everything a probe needs for one domain.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub domain: Arc<str>,
    pub config: Arc<ScanConfig>,
    pub http: ProbeClient,
    /// Cancelled when the probe's guard gives up or the whole scan is cancelled.
    pub cancel: CancellationToken,
}

impl ProbeContext {
    pub fn url(&self, path: &str) -> String {
        url::build_url_with_scheme(self.config.scheme, &self.domain, path)
    }
}

/// A detection strategy for one protocol.
///
/// Implementations must not fail: network and parse problems are folded into
/// the returned result, usually as a `not_detected` status.
#[async_trait]
pub trait ProtocolProbe: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult;
}

/// Tracks candidate paths of a multi-path probe.
///
/// A probe that got at least one HTTP response and found nothing is a clean
/// negative. One whose every request failed in transport never saw the
/// server at all, so it reports low confidence with the last error.
#[derive(Debug, Default)]
pub(crate) struct Attempts {
    responded: bool,
    last_error: Option<ProbeError>,
}

impl Attempts {
    pub(crate) fn record(
        &mut self,
        protocol: Protocol,
        res: Result<ProbeResponse, ProbeError>,
    ) -> Option<ProbeResponse> {
        match res {
            Ok(resp) => {
                self.responded = true;
                Some(resp)
            }
            Err(err) => {
                debug!(%protocol, error = %err, "candidate request failed");
                self.last_error = Some(err);
                None
            }
        }
    }

    pub(crate) fn exhausted(self, protocol: Protocol) -> ProbeResult {
        match (self.responded, self.last_error) {
            (false, Some(err)) => ProbeResult::failed(protocol, err),
            _ => ProbeResult::not_detected(protocol),
        }
    }
}

/// GET a single well-known JSON profile.
///
/// `Ok(None)` means the server answered but had no profile: a non-2xx status,
/// a body that is not JSON, or an object lacking every one of `required_any`.
pub(crate) async fn fetch_profile(
    ctx: &ProbeContext,
    path: &str,
    required_any: &[&str],
) -> Result<Option<(String, Map<String, Value>)>, ProbeError> {
    let url = ctx.url(path);
    let resp = ctx.http.get(&url, Some(ACCEPT_JSON), &ctx.cancel).await?;
    if !resp.is_success() {
        debug!(%url, status = %resp.status, "no profile");
        return Ok(None);
    }
    Ok(signals::parse_manifest(&resp.body, required_any).map(|manifest| (url, manifest)))
}

pub(crate) async fn fetch_homepage(ctx: &ProbeContext) -> Result<ProbeResponse, ProbeError> {
    let url = ctx.url("/");
    ctx.http.get(&url, Some(ACCEPT_HTML), &ctx.cancel).await
}

/// Ordered protocol → probe map. Iteration follows the canonical protocol order.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: BTreeMap<Protocol, Arc<dyn ProtocolProbe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All eight built-in probes.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UcpProbe));
        registry.register(Arc::new(AcpProbe));
        registry.register(Arc::new(X402Probe));
        registry.register(Arc::new(Ap2Probe));
        registry.register(Arc::new(McpProbe));
        registry.register(Arc::new(NlwebProbe));
        registry.register(Arc::new(VisaVicProbe));
        registry.register(Arc::new(MastercardProbe));
        registry
    }

    /// Insert or replace the probe for `probe.protocol()`.
    pub fn register(&mut self, probe: Arc<dyn ProtocolProbe>) -> &mut Self {
        self.probes.insert(probe.protocol(), probe);
        self
    }

    /// Keep only the given protocols.
    pub fn retain(&mut self, protocols: &[Protocol]) -> &mut Self {
        self.probes.retain(|p, _| protocols.contains(p));
        self
    }

    pub fn protocols(&self) -> Vec<Protocol> {
        self.probes.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Protocol, &Arc<dyn ProtocolProbe>)> {
        self.probes.iter().map(|(p, probe)| (*p, probe))
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.probes.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_protocol_in_order() {
        let registry = ProbeRegistry::standard();
        assert_eq!(registry.protocols(), Protocol::ALL.to_vec());
        for (protocol, probe) in registry.iter() {
            assert_eq!(probe.protocol(), protocol);
        }
    }

    #[test]
    fn retain_keeps_canonical_order() {
        let mut registry = ProbeRegistry::standard();
        registry.retain(&[Protocol::MastercardAgentpay, Protocol::Acp]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.protocols(), vec![Protocol::Acp, Protocol::MastercardAgentpay]);

        registry.retain(&[]);
        assert!(registry.is_empty());
    }
}
