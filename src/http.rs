use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{redirect, Method, RequestBuilder, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::ScanConfig;
use crate::error::ProbeError;
use crate::signals;

/// Bodies are truncated past this size; homepages are the largest thing we read.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml";

/// A fully read response from one probe request.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        signals::header_value(&self.headers, name)
    }

    pub fn is_json(&self) -> bool {
        signals::is_json_content_type(&self.headers)
    }
}

/// Outbound HTTP shared by every probe of a scanner.
///
/// Holds two clients because the redirect policy is per client: most probes
/// follow redirects, the x402 probe needs to see a 402 before any redirect.
#[derive(Debug, Clone)]
pub struct ProbeClient {
    follow: reqwest::Client,
    manual: reqwest::Client,
    timeout: Duration,
}

impl ProbeClient {
    pub fn new(config: &ScanConfig) -> Result<Self, reqwest::Error> {
        let follow = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()?;
        let manual = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            follow,
            manual,
            timeout: config.timeout(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get(
        &self,
        url: &str,
        accept: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ProbeResponse, ProbeError> {
        let mut req = self.follow.get(url);
        if let Some(accept) = accept {
            req = req.header(ACCEPT, accept);
        }
        self.send(req, url, cancel).await
    }

    /// GET without following redirects, so a 3xx comes back as-is.
    pub async fn get_no_redirect(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ProbeResponse, ProbeError> {
        let req = self.manual.get(url);
        self.send(req, url, cancel).await
    }

    pub async fn options(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ProbeResponse, ProbeError> {
        let req = self.follow.request(Method::OPTIONS, url);
        self.send(req, url, cancel).await
    }

    async fn send(
        &self,
        req: RequestBuilder,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ProbeResponse, ProbeError> {
        let timeout = self.timeout;
        let fetch = async {
            let resp = req
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ProbeError::from_reqwest(url, timeout, e))?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = read_body(resp)
                .await
                .map_err(|e| ProbeError::from_reqwest(url, timeout, e))?;
            trace!(%url, %status, bytes = body.len(), "probe response");
            Ok(ProbeResponse {
                url: url.to_string(),
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProbeError::Cancelled { url: url.to_string() }),
            res = fetch => res,
        }
    }
}

async fn read_body(mut resp: reqwest::Response) -> Result<String, reqwest::Error> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = MAX_BODY_BYTES - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
