use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Attempts, ProbeContext, ProtocolProbe};
use crate::http::ACCEPT_JSON;
use crate::signals;
use crate::types::{Confidence, ProbeResult, Protocol};

const CANDIDATE_PATHS: &[&str] = &[
    "/.well-known/nlweb",
    "/.well-known/nlweb.json",
    "/nlweb",
    "/sites",
    "/ask",
];

/// NLWeb: any JSON answer from one of its conventional endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NlwebProbe;

/// The whole parsed body becomes the capability map; non-objects are wrapped.
fn body_capabilities(body: Value) -> Map<String, Value> {
    match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("response".to_string(), other);
            map
        }
    }
}

#[async_trait]
impl ProtocolProbe for NlwebProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Nlweb
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let mut attempts = Attempts::default();

        for path in CANDIDATE_PATHS {
            let url = ctx.url(path);
            let res = ctx.http.get(&url, Some(ACCEPT_JSON), &ctx.cancel).await;
            let Some(resp) = attempts.record(Protocol::Nlweb, res) else {
                continue;
            };
            if !(resp.is_success() && resp.is_json()) {
                debug!(%url, status = %resp.status, "not an nlweb json endpoint");
                continue;
            }
            let Some(body) = signals::parse_json(&resp.body) else {
                debug!(%url, "nlweb candidate body is not json");
                continue;
            };

            info!(domain = %ctx.domain, %path, "nlweb endpoint found");
            return ProbeResult::confirmed(Protocol::Nlweb, Confidence::High)
                .with_method(format!("GET {path}"))
                .with_endpoint(url)
                .with_capability_map(body_capabilities(body));
        }

        attempts.exhausted(Protocol::Nlweb)
    }
}
