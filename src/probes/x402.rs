use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Attempts, ProbeContext, ProtocolProbe};
use crate::http::{ProbeResponse, ACCEPT_JSON};
use crate::signals::{self, string_field};
use crate::types::{Confidence, ProbeResult, Protocol};

/// Bazaar discovery manifest.
const MANIFEST_PATH: &str = "/.well-known/x402.json";

/// Paths that commonly sit behind an x402 paywall, tried in order.
const PAYWALL_PATHS: &[&str] = &[
    "/x402",
    "/api/x402",
    "/.well-known/x402",
    "/paid",
    "/api/paid",
];

/// Resource lists a Bazaar manifest may carry; the first non-empty one wins.
const RESOURCE_LISTS: &[&str] = &["resources", "endpoints", "services"];

const MAX_LISTED_RESOURCES: usize = 5;

const PAYMENT_REQUIRED_HEADER: &str = "x-payment-required";
const VERSION_HEADER: &str = "x-402-version";

/// x402: a Bazaar manifest, or a literal `402 Payment Required`.
#[derive(Debug, Clone, Copy, Default)]
pub struct X402Probe;

#[derive(Debug, Serialize)]
struct BazaarCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<Value>,
    resource_count: usize,
    resources: Vec<BazaarResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepts: Option<Value>,
    bazaar: bool,
}

#[derive(Debug, Serialize, PartialEq)]
struct BazaarResource {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaywallCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepts: Option<Value>,
    status_code: u16,
}

fn is_bazaar_manifest(manifest: &Map<String, Value>) -> bool {
    RESOURCE_LISTS
        .iter()
        .any(|k| manifest.get(*k).is_some_and(Value::is_array))
        || manifest.contains_key("x402Version")
        || manifest.contains_key("accepts")
}

fn first_str(item: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| string_field(item, k))
}

fn bazaar_resource(item: &Value) -> BazaarResource {
    match item {
        Value::String(path) => BazaarResource {
            path: Some(path.clone()),
            method: "GET".to_string(),
            price: None,
            currency: None,
        },
        Value::Object(obj) => BazaarResource {
            path: first_str(obj, &["path", "url", "resource", "endpoint"]),
            method: first_str(obj, &["method"])
                .map(|m| m.to_ascii_uppercase())
                .unwrap_or_else(|| "GET".to_string()),
            price: ["price", "maxAmountRequired", "amount"]
                .iter()
                .find_map(|k| obj.get(*k).cloned()),
            currency: first_str(obj, &["currency", "asset", "token"]),
        },
        _ => BazaarResource {
            path: None,
            method: "GET".to_string(),
            price: None,
            currency: None,
        },
    }
}

impl BazaarCapabilities {
    fn from_manifest(manifest: &Map<String, Value>) -> Self {
        let list = RESOURCE_LISTS
            .iter()
            .filter_map(|k| manifest.get(*k).and_then(Value::as_array))
            .find(|items| !items.is_empty());
        Self {
            version: manifest
                .get("x402Version")
                .or_else(|| manifest.get("version"))
                .cloned(),
            resource_count: list.map_or(0, Vec::len),
            resources: list
                .map(|items| {
                    items
                        .iter()
                        .take(MAX_LISTED_RESOURCES)
                        .map(bazaar_resource)
                        .collect()
                })
                .unwrap_or_default(),
            accepts: manifest.get("accepts").cloned(),
            bazaar: true,
        }
    }

    fn is_functional(&self) -> bool {
        self.resource_count > 0
            || self
                .accepts
                .as_ref()
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty())
    }
}

impl PaywallCapabilities {
    /// Headers first; a `PaymentRequired` JSON body fills in what they lack.
    fn from_response(resp: &ProbeResponse) -> Self {
        let body = signals::parse_manifest(&resp.body, &["x402Version", "accepts"]);
        let version = resp
            .header(VERSION_HEADER)
            .map(str::to_string)
            .or_else(|| body.as_ref().and_then(|b| string_field(b, "x402Version")));
        Self {
            version,
            price: resp.header(PAYMENT_REQUIRED_HEADER).map(str::to_string),
            accepts: body.as_ref().and_then(|b| b.get("accepts").cloned()),
            status_code: resp.status.as_u16(),
        }
    }
}

#[async_trait]
impl ProtocolProbe for X402Probe {
    fn protocol(&self) -> Protocol {
        Protocol::X402
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let mut attempts = Attempts::default();

        let url = ctx.url(MANIFEST_PATH);
        let res = ctx.http.get(&url, Some(ACCEPT_JSON), &ctx.cancel).await;
        if let Some(resp) = attempts.record(Protocol::X402, res) {
            let manifest = (resp.is_success() && resp.is_json())
                .then(|| signals::parse_manifest(&resp.body, &[]))
                .flatten()
                .filter(is_bazaar_manifest);
            if let Some(manifest) = manifest {
                let caps = BazaarCapabilities::from_manifest(&manifest);
                info!(domain = %ctx.domain, resources = caps.resource_count, "x402 bazaar manifest found");
                return ProbeResult::confirmed(Protocol::X402, Confidence::High)
                    .with_method(format!("GET {MANIFEST_PATH}"))
                    .with_endpoint(url)
                    .with_functional(caps.is_functional())
                    .with_capabilities(&caps);
            }
            debug!(%url, status = %resp.status, "no bazaar manifest");
        }

        for path in PAYWALL_PATHS {
            let url = ctx.url(path);
            let res = ctx.http.get_no_redirect(&url, &ctx.cancel).await;
            let Some(resp) = attempts.record(Protocol::X402, res) else {
                continue;
            };
            if resp.status == StatusCode::PAYMENT_REQUIRED {
                info!(domain = %ctx.domain, %path, "x402 paywall found");
                return ProbeResult::confirmed(Protocol::X402, Confidence::High)
                    .with_method(format!("GET {path} (402)"))
                    .with_endpoint(url)
                    .with_functional(true)
                    .with_capabilities(&PaywallCapabilities::from_response(&resp));
            }
            debug!(%url, status = %resp.status, "no 402");
        }

        attempts.exhausted(Protocol::X402)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn manifest_shape() {
        assert!(is_bazaar_manifest(&object(json!({"resources": []}))));
        assert!(is_bazaar_manifest(&object(json!({"x402Version": 1}))));
        assert!(is_bazaar_manifest(&object(json!({"accepts": [{"scheme": "exact"}]}))));
        assert!(!is_bazaar_manifest(&object(json!({"resources": "all"}))));
        assert!(!is_bazaar_manifest(&object(json!({"name": "shop"}))));
    }

    #[test]
    fn manifest_lists_at_most_five_resources() {
        let items: Vec<Value> = (0..8)
            .map(|i| json!({"path": format!("/r/{i}"), "method": "post", "price": "0.01", "currency": "USDC"}))
            .collect();
        let caps = BazaarCapabilities::from_manifest(&object(json!({
            "x402Version": 2,
            "resources": items,
        })));
        assert_eq!(caps.resource_count, 8);
        assert_eq!(caps.resources.len(), 5);
        assert_eq!(
            caps.resources[0],
            BazaarResource {
                path: Some("/r/0".into()),
                method: "POST".into(),
                price: Some(json!("0.01")),
                currency: Some("USDC".into()),
            }
        );
        assert_eq!(caps.version, Some(json!(2)));
        assert!(caps.is_functional());
    }

    #[test]
    fn manifest_falls_back_to_endpoints_and_x402_field_names() {
        let caps = BazaarCapabilities::from_manifest(&object(json!({
            "resources": [],
            "endpoints": [{"url": "/weather", "maxAmountRequired": "1000", "asset": "0xabc"}, "/news"],
        })));
        assert_eq!(caps.resource_count, 2);
        assert_eq!(caps.resources[0].path.as_deref(), Some("/weather"));
        assert_eq!(caps.resources[0].price, Some(json!("1000")));
        assert_eq!(caps.resources[0].currency.as_deref(), Some("0xabc"));
        assert_eq!(caps.resources[1].path.as_deref(), Some("/news"));
        assert_eq!(caps.resources[1].method, "GET");
    }

    #[test]
    fn accepts_only_manifest_is_functional() {
        let caps = BazaarCapabilities::from_manifest(&object(json!({"accepts": [{"scheme": "exact"}]})));
        assert_eq!(caps.resource_count, 0);
        assert!(caps.is_functional());
        let serialized = serde_json::to_value(&caps).unwrap();
        assert_eq!(serialized["bazaar"], json!(true));
        assert!(serialized.get("version").is_none());
    }
}
