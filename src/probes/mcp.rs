use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Attempts, ProbeContext, ProtocolProbe};
use crate::http::ACCEPT_JSON;
use crate::signals::{self, array_len, string_field};
use crate::types::{Confidence, ProbeResult, Protocol};

const MANIFEST_PATHS: &[&str] = &[
    "/.well-known/mcp.json",
    "/.well-known/mcp",
    "/.well-known/mcp/manifest.json",
    "/mcp.json",
];

/// A manifest must carry at least one of these to count.
const MANIFEST_KEYS: &[&str] = &[
    "name",
    "tools",
    "resources",
    "prompts",
    "capabilities",
    "protocolVersion",
    "serverInfo",
    "endpoint",
    "mcpServers",
];

const MAX_LISTED_TOOLS: usize = 10;

/// Model Context Protocol server manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct McpProbe;

#[derive(Debug, Serialize)]
struct McpCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol_version: Option<String>,
    tool_count: usize,
    resource_count: usize,
    prompt_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<String>,
}

impl McpCapabilities {
    fn from_manifest(manifest: &Map<String, Value>) -> Self {
        let server_info = manifest.get("serverInfo").and_then(Value::as_object);
        let tools: Vec<String> = manifest
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|t| match t {
                        Value::String(name) => Some(name.clone()),
                        Value::Object(obj) => string_field(obj, "name"),
                        _ => None,
                    })
                    .take(MAX_LISTED_TOOLS)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: string_field(manifest, "name")
                .or_else(|| server_info.and_then(|s| string_field(s, "name"))),
            version: string_field(manifest, "version")
                .or_else(|| server_info.and_then(|s| string_field(s, "version"))),
            protocol_version: string_field(manifest, "protocolVersion"),
            tool_count: array_len(manifest, "tools"),
            resource_count: array_len(manifest, "resources"),
            prompt_count: array_len(manifest, "prompts"),
            tools,
            endpoint: string_field(manifest, "endpoint").or_else(|| string_field(manifest, "url")),
            transport: string_field(manifest, "transport"),
        }
    }

    fn is_functional(&self) -> bool {
        self.tool_count > 0 || self.resource_count > 0
    }
}

#[async_trait]
impl ProtocolProbe for McpProbe {
    fn protocol(&self) -> Protocol {
        Protocol::Mcp
    }

    async fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let mut attempts = Attempts::default();

        for path in MANIFEST_PATHS {
            let url = ctx.url(path);
            let res = ctx.http.get(&url, Some(ACCEPT_JSON), &ctx.cancel).await;
            let Some(resp) = attempts.record(Protocol::Mcp, res) else {
                continue;
            };
            let manifest = resp
                .is_success()
                .then(|| signals::parse_manifest(&resp.body, MANIFEST_KEYS))
                .flatten();
            let Some(manifest) = manifest else {
                debug!(%url, status = %resp.status, "no mcp manifest");
                continue;
            };

            let caps = McpCapabilities::from_manifest(&manifest);
            info!(domain = %ctx.domain, %path, tools = caps.tool_count, "mcp manifest found");
            return ProbeResult::confirmed(Protocol::Mcp, Confidence::High)
                .with_method(format!("GET {path}"))
                .with_endpoint(url)
                .with_functional(caps.is_functional())
                .with_capabilities(&caps);
        }

        attempts.exhausted(Protocol::Mcp)
    }
}
