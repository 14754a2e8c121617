use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{fetch_profile, ProbeContext, ProtocolProbe};
use crate::signals::{array_len, has_non_empty_array, string_field};
use crate::types::{Confidence, ProbeResult, Protocol};

const PROFILE_PATH: &str = "/.well-known/ucp";

const PROFILE_KEYS: &[&str] = &[
    "version",
    "checkout_types",
    "handlers",
    "capabilities",
    "services",
    "ucp",
];

const MAX_LISTED_HANDLERS: usize = 10;

/// Universal Commerce Protocol business profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct UcpProbe;

#[derive(Debug, Serialize)]
struct UcpCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checkout_types: Option<Value>,
    handler_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    handlers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<Value>,
}

impl UcpCapabilities {
    fn from_profile(profile: &Map<String, Value>) -> Self {
        // Profiles sometimes nest everything under a top-level "ucp" object.
        let body = profile
            .get("ucp")
            .and_then(Value::as_object)
            .unwrap_or(profile);
        let handlers: Vec<String> = body
            .get("handlers")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|h| match h {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(obj) => {
                            string_field(obj, "name").or_else(|| string_field(obj, "id"))
                        }
                        _ => None,
                    })
                    .take(MAX_LISTED_HANDLERS)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            version: string_field(body, "version"),
            checkout_types: body.get("checkout_types").cloned(),
            handler_count: array_len(body, "handlers"),
            handlers,
            capabilities: body.get("capabilities").cloned(),
        }
    }
}

fn is_functional(profile: &Map<String, Value>) -> bool {
    let body = profile
        .get("ucp")
        .and_then(Value::as_object)
        .unwrap_or(profile);
    has_non_empty_array(body, "checkout_types") || has_non_empty_array(body, "handlers")
}

#[async_trait]
impl ProtocolProbe for UcpProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Ucp
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        match fetch_profile(ctx, PROFILE_PATH, PROFILE_KEYS).await {
            Ok(Some((url, profile))) => {
                info!(domain = %ctx.domain, "ucp profile found");
                ProbeResult::confirmed(Protocol::Ucp, Confidence::High)
                    .with_method(format!("GET {PROFILE_PATH}"))
                    .with_endpoint(url)
                    .with_functional(is_functional(&profile))
                    .with_capabilities(&UcpCapabilities::from_profile(&profile))
            }
            Ok(None) => ProbeResult::not_detected(Protocol::Ucp),
            Err(err) => {
                debug!(domain = %ctx.domain, error = %err, "ucp profile unreachable");
                ProbeResult::failed(Protocol::Ucp, err)
            }
        }
    }
}
