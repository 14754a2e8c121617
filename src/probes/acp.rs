use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use super::{Attempts, ProbeContext, ProtocolProbe};
use crate::signals::{has_all_headers, has_header, header_is_iso_date, header_value};
use crate::types::{Confidence, ProbeResult, Protocol};

/// Tried with OPTIONS, in this order.
const OPTIONS_PATHS: &[&str] = &[
    "/checkout_sessions",
    "/acp/checkout_sessions",
    "/acp/checkout",
    "/.well-known/acp",
];

const FALLBACK_PATH: &str = "/checkout_sessions";

const ACP_VERSION: &str = "x-acp-version";
const API_VERSION: &str = "api-version";
const IDEMPOTENCY_KEY: &str = "idempotency-key";
const REQUEST_ID: &str = "request-id";

/// Agentic Commerce Protocol: header signals on the checkout session API.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcpProbe;

#[derive(Debug, Serialize)]
struct AcpCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    allowed_methods: Vec<String>,
    idempotency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_auth: Option<bool>,
}

impl AcpCapabilities {
    fn from_headers(headers: &HeaderMap) -> Self {
        let version = header_value(headers, ACP_VERSION)
            .or_else(|| header_value(headers, API_VERSION))
            .map(str::to_string);
        let allowed_methods: Vec<String> = header_value(headers, "allow")
            .or_else(|| header_value(headers, "access-control-allow-methods"))
            .map(|v| {
                v.split(',')
                    .map(|m| m.trim().to_ascii_uppercase())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            version,
            allowed_methods,
            idempotency: has_header(headers, IDEMPOTENCY_KEY),
            requires_auth: None,
        }
    }
}

/// Any one of the header combinations an ACP server typically returns.
fn has_combined_signal(headers: &HeaderMap) -> bool {
    has_header(headers, ACP_VERSION)
        || has_all_headers(headers, &[IDEMPOTENCY_KEY, REQUEST_ID])
        || has_all_headers(headers, &[API_VERSION, REQUEST_ID])
}

fn has_options_signal(headers: &HeaderMap) -> bool {
    has_header(headers, ACP_VERSION)
        || (header_is_iso_date(headers, API_VERSION) && has_combined_signal(headers))
}

#[async_trait]
impl ProtocolProbe for AcpProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Acp
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let mut attempts = Attempts::default();

        for path in OPTIONS_PATHS {
            let url = ctx.url(path);
            let res = ctx.http.options(&url, &ctx.cancel).await;
            let Some(resp) = attempts.record(Protocol::Acp, res) else {
                continue;
            };
            if has_options_signal(&resp.headers) {
                info!(domain = %ctx.domain, %path, "acp detected via OPTIONS");
                return ProbeResult::confirmed(Protocol::Acp, Confidence::High)
                    .with_method(format!("OPTIONS {path}"))
                    .with_endpoint(url)
                    .with_capabilities(&AcpCapabilities::from_headers(&resp.headers));
            }
            debug!(%url, status = %resp.status, "no acp headers");
        }

        // Auth-gated servers may refuse OPTIONS but still answer GET with the headers.
        let url = ctx.url(FALLBACK_PATH);
        let res = ctx.http.get(&url, None, &ctx.cancel).await;
        if let Some(resp) = attempts.record(Protocol::Acp, res) {
            let gated = matches!(
                resp.status,
                StatusCode::UNAUTHORIZED | StatusCode::METHOD_NOT_ALLOWED
            );
            if gated && has_combined_signal(&resp.headers) {
                info!(domain = %ctx.domain, status = %resp.status, "acp detected via GET fallback");
                let mut caps = AcpCapabilities::from_headers(&resp.headers);
                caps.requires_auth = Some(resp.status == StatusCode::UNAUTHORIZED);
                return ProbeResult::confirmed(Protocol::Acp, Confidence::Medium)
                    .with_method(format!("GET {FALLBACK_PATH} ({})", resp.status.as_u16()))
                    .with_endpoint(url)
                    .with_capabilities(&caps);
            }
        }

        attempts.exhausted(Protocol::Acp)
    }
}
