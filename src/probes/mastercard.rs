use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{fetch_homepage, ProbeContext, ProtocolProbe};
use crate::signals::HtmlDocument;
use crate::types::{Confidence, ProbeResult, ProbeStatus, Protocol};

const META_NEEDLE: &str = "mastercard";

const SCRIPT_SIGNATURES: &[&str] = &[
    "agentpay.mastercard",
    "mastercard.com/agent-pay",
    "mastercard-agent-pay",
    "src.mastercard.com",
    "agent-pay-sdk",
];

/// Lower-case substrings searched across the whole page, inline text included.
const BODY_SIGNATURES: &[&str] = &[
    "mastercard agent pay",
    "mastercard-agent-pay",
    "agentpay.mastercard",
    "mastercardagentpay",
    "agent_pay_token",
];

/// Mastercard Agent Pay markers on the storefront homepage.
#[derive(Debug, Clone, Copy, Default)]
pub struct MastercardProbe;

#[derive(Debug, Default, Serialize)]
struct AgentPayCapabilities {
    signals: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meta: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sdk_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_signature: Option<&'static str>,
}

impl AgentPayCapabilities {
    fn from_document(doc: &HtmlDocument) -> Self {
        let mut caps = Self::default();

        let metas = doc.meta_containing(META_NEEDLE);
        if !metas.is_empty() {
            caps.signals.push("meta");
            caps.meta = metas
                .into_iter()
                .filter_map(|m| m.name.clone().or_else(|| m.property.clone()))
                .collect();
        }
        if let Some(src) = doc.script_src_matching(SCRIPT_SIGNATURES) {
            caps.signals.push("script_src");
            caps.sdk_url = Some(src.to_string());
        }
        if let Some(sig) = doc.body_contains(BODY_SIGNATURES) {
            caps.signals.push("body");
            caps.body_signature = Some(sig);
        }
        caps
    }

    /// Only a textual mention, no markup wiring it up.
    fn body_only(&self) -> bool {
        self.signals == ["body"]
    }
}

#[async_trait]
impl ProtocolProbe for MastercardProbe {
    fn protocol(&self) -> Protocol {
        Protocol::MastercardAgentpay
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let resp = match fetch_homepage(ctx).await {
            Ok(resp) => resp,
            Err(err) => {
                debug!(domain = %ctx.domain, error = %err, "homepage unreachable");
                return ProbeResult::failed(Protocol::MastercardAgentpay, err);
            }
        };
        if !resp.is_success() {
            debug!(domain = %ctx.domain, status = %resp.status, "homepage not ok");
            return ProbeResult::new(
                Protocol::MastercardAgentpay,
                ProbeStatus::NotDetected,
                Confidence::Low,
            );
        }

        let caps = AgentPayCapabilities::from_document(&HtmlDocument::parse(&resp.body));
        if caps.signals.is_empty() {
            return ProbeResult::not_detected(Protocol::MastercardAgentpay);
        }

        info!(domain = %ctx.domain, signals = ?caps.signals, "mastercard agent pay markers found");
        let (status, confidence) = if caps.body_only() {
            (ProbeStatus::Eligible, Confidence::Medium)
        } else {
            (ProbeStatus::PlatformEnabled, Confidence::High)
        };
        let endpoint = caps.sdk_url.clone().unwrap_or_else(|| resp.url.clone());
        ProbeResult::new(Protocol::MastercardAgentpay, status, confidence)
            .with_method(format!("GET / ({})", caps.signals.join(", ")))
            .with_endpoint(endpoint)
            .with_capabilities(&caps)
    }
}
