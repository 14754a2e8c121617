use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{fetch_homepage, ProbeContext, ProtocolProbe};
use crate::signals::HtmlDocument;
use crate::types::{Confidence, ProbeResult, ProbeStatus, Protocol};

/// Exact `<meta name>` values used by VIC-enabled storefronts.
const META_NAMES: &[&str] = &[
    "visa-intelligent-commerce",
    "visa-vic",
    "vic-merchant-id",
    "visa:intelligent-commerce",
];

const SDK_SIGNATURES: &[&str] = &[
    "intelligentcommerce.visa.com",
    "vic.visa.com",
    "visa-intelligent-commerce",
    "vic-sdk",
];

const DATA_PREFIX: &str = "data-vic-";

const INIT_TOKENS: &[&str] = &[
    "VisaIntelligentCommerce.init",
    "window.VIC.init",
    "VIC.initialize(",
];

/// Visa Intelligent Commerce markers on the storefront homepage.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisaVicProbe;

#[derive(Debug, Default, Serialize)]
struct VicCapabilities {
    signals: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meta: Vec<VicMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sdk_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    data_attributes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_token: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct VicMeta {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl VicCapabilities {
    fn from_document(doc: &HtmlDocument) -> Self {
        let mut caps = Self::default();

        let metas = doc.meta_named(META_NAMES);
        if !metas.is_empty() {
            caps.signals.push("meta");
            caps.meta = metas
                .into_iter()
                .map(|m| VicMeta {
                    name: m.name.clone().unwrap_or_default(),
                    content: m.content.clone(),
                })
                .collect();
        }
        if let Some(src) = doc.script_src_matching(SDK_SIGNATURES) {
            caps.signals.push("script_src");
            caps.sdk_url = Some(src.to_string());
        }
        let data = doc.data_attributes_with_prefix(DATA_PREFIX);
        if !data.is_empty() {
            caps.signals.push("data_attribute");
            caps.data_attributes = data.into_iter().map(str::to_string).collect();
        }
        if let Some(token) = doc.inline_script_token(INIT_TOKENS) {
            caps.signals.push("inline_script");
            caps.init_token = Some(token);
        }
        caps
    }
}

#[async_trait]
impl ProtocolProbe for VisaVicProbe {
    fn protocol(&self) -> Protocol {
        Protocol::VisaVic
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let resp = match fetch_homepage(ctx).await {
            Ok(resp) => resp,
            Err(err) => {
                debug!(domain = %ctx.domain, error = %err, "homepage unreachable");
                return ProbeResult::failed(Protocol::VisaVic, err);
            }
        };
        // Without the page there is nothing to judge, only a weak negative.
        if !resp.is_success() {
            debug!(domain = %ctx.domain, status = %resp.status, "homepage not ok");
            return ProbeResult::new(Protocol::VisaVic, ProbeStatus::NotDetected, Confidence::Low);
        }

        let caps = VicCapabilities::from_document(&HtmlDocument::parse(&resp.body));
        if caps.signals.is_empty() {
            return ProbeResult::not_detected(Protocol::VisaVic);
        }

        info!(domain = %ctx.domain, signals = ?caps.signals, "visa intelligent commerce markers found");
        let endpoint = caps.sdk_url.clone().unwrap_or_else(|| resp.url.clone());
        ProbeResult::new(Protocol::VisaVic, ProbeStatus::PlatformEnabled, Confidence::High)
            .with_method(format!("GET / ({})", caps.signals.join(", ")))
            .with_endpoint(endpoint)
            .with_capabilities(&caps)
    }
}
