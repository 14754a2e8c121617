use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{fetch_profile, ProbeContext, ProtocolProbe};
use crate::signals::string_field;
use crate::types::{Confidence, ProbeResult, Protocol};

const PROFILE_PATH: &str = "/.well-known/ap2";

const PROFILE_KEYS: &[&str] = &[
    "version",
    "mandate_types",
    "payment_methods",
    "capabilities",
    "endpoints",
    "roles",
];

/// Agent Payments Protocol profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ap2Probe;

#[derive(Debug, Serialize)]
struct Ap2Capabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mandate_types: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_methods: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    roles: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoints: Option<Value>,
}

impl Ap2Capabilities {
    fn from_profile(profile: &Map<String, Value>) -> Self {
        Self {
            version: string_field(profile, "version"),
            mandate_types: profile.get("mandate_types").cloned(),
            payment_methods: profile.get("payment_methods").cloned(),
            roles: profile.get("roles").cloned(),
            endpoints: profile.get("endpoints").cloned(),
        }
    }
}

/// A profile naming its mandate types or its version is usable as-is.
fn is_functional(profile: &Map<String, Value>) -> bool {
    profile.contains_key("mandate_types") || profile.contains_key("version")
}

#[async_trait]
impl ProtocolProbe for Ap2Probe {
    fn protocol(&self) -> Protocol {
        Protocol::Ap2
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        match fetch_profile(ctx, PROFILE_PATH, PROFILE_KEYS).await {
            Ok(Some((url, profile))) => {
                info!(domain = %ctx.domain, "ap2 profile found");
                ProbeResult::confirmed(Protocol::Ap2, Confidence::High)
                    .with_method(format!("GET {PROFILE_PATH}"))
                    .with_endpoint(url)
                    .with_functional(is_functional(&profile))
                    .with_capabilities(&Ap2Capabilities::from_profile(&profile))
            }
            Ok(None) => ProbeResult::not_detected(Protocol::Ap2),
            Err(err) => {
                debug!(domain = %ctx.domain, error = %err, "ap2 profile unreachable");
                ProbeResult::failed(Protocol::Ap2, err)
            }
        }
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
    fn profile_fields_are_copied() {
        let profile = object(json!({
            "version": "0.1",
            "mandate_types": ["intent", "cart"],
            "payment_methods": ["card"],
            "roles": ["merchant"],
            "endpoints": {"mandates": "/ap2/mandates"},
        }));
        let caps = Ap2Capabilities::from_profile(&profile);
        assert_eq!(caps.version.as_deref(), Some("0.1"));
        assert_eq!(caps.mandate_types, Some(json!(["intent", "cart"])));
        assert_eq!(caps.payment_methods, Some(json!(["card"])));
        assert_eq!(caps.roles, Some(json!(["merchant"])));
        assert_eq!(caps.endpoints, Some(json!({"mandates": "/ap2/mandates"})));
    }

    #[test]
    fn missing_fields_are_skipped_when_serialized() {
        let caps = Ap2Capabilities::from_profile(&object(json!({"roles": ["shopper"]})));
        let v = serde_json::to_value(&caps).unwrap();
        assert_eq!(v, json!({"roles": ["shopper"]}));
    }

    #[test]
    fn mandate_types_or_version_make_it_functional() {
        assert!(is_functional(&object(json!({"mandate_types": []}))));
        assert!(is_functional(&object(json!({"version": "1"}))));
        assert!(!is_functional(&object(json!({"roles": ["merchant"], "endpoints": {}}))));
    }
}
