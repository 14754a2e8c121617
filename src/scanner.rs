use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use time::format_description::well_known;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ScanConfig, MAX_CONCURRENT_PROBES};
use crate::error::ScanError;
use crate::guard::{self, Guarded};
use crate::http::ProbeClient;
use crate::probes::{ProbeContext, ProbeRegistry, ProtocolProbe};
use crate::types::{Confidence, ProbeResult, Protocol};

/// Fingerprint `domain` with every configured protocol probe.
///
/// Never fails: a configuration or client problem yields one `not_detected`
/// result per configured protocol carrying the error.
pub async fn run_probes(domain: &str, config: &ScanConfig) -> Vec<ProbeResult> {
    match Scanner::new(config.clone()) {
        Ok(scanner) => scanner.run_probes(domain).await,
        Err(err) => {
            warn!(%domain, error = %err, "scanner setup failed");
            let mut protocols = config.protocols.clone();
            protocols.sort();
            protocols.dedup();
            protocols
                .into_iter()
                .map(|p| ProbeResult::failed(p, &err))
                .collect()
        }
    }
}

/// Reusable probe orchestrator.
///
/// Holds the HTTP clients, the probe registry and the worker limiter, so many
/// domains can be scanned with the same instance, concurrently or not.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: Arc<ScanConfig>,
    http: ProbeClient,
    registry: ProbeRegistry,
    limiter: Arc<Semaphore>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let permits = config.max_concurrent_probes.clamp(1, MAX_CONCURRENT_PROBES);
        let limiter = Arc::new(Semaphore::new(permits));
        Self::with_limiter(config, limiter)
    }

    /// Share `limiter` with other scanners to bound in-flight probes across all of them.
    pub fn with_limiter(config: ScanConfig, limiter: Arc<Semaphore>) -> Result<Self, ScanError> {
        config.validate()?;
        let http = ProbeClient::new(&config)?;
        let mut registry = ProbeRegistry::standard();
        registry.retain(&config.protocols);
        Ok(Self {
            config: Arc::new(config),
            http,
            registry,
            limiter,
        })
    }

    /// Replace or add a probe. Protocols outside the configured set are ignored.
    pub fn with_probe(mut self, probe: Arc<dyn ProtocolProbe>) -> Self {
        if self.config.protocols.contains(&probe.protocol()) {
            self.registry.register(probe);
        }
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn protocols(&self) -> Vec<Protocol> {
        self.registry.protocols()
    }

    pub fn limiter(&self) -> Arc<Semaphore> {
        self.limiter.clone()
    }

    pub async fn run_probes(&self, domain: &str) -> Vec<ProbeResult> {
        self.run_probes_with_cancel(domain, CancellationToken::new())
            .await
    }

    /// Variant that accepts a `CancellationToken` to allow external cancellation.
    ///
    /// Probes still running when `cancel` fires resolve to their fallback.
    pub async fn run_probes_with_cancel(
        &self,
        domain: &str,
        cancel: CancellationToken,
    ) -> Vec<ProbeResult> {
        let domain: Arc<str> = Arc::from(domain);
        let deadline = self.config.guard_timeout();
        let started = Instant::now();

        let mut slots: Vec<(Protocol, Option<ProbeResult>)> =
            self.registry.protocols().into_iter().map(|p| (p, None)).collect();
        let mut task_slots = HashMap::with_capacity(self.registry.len());
        let mut set = JoinSet::new();

        for (idx, (protocol, probe)) in self.registry.iter().enumerate() {
            // A saturated shared limiter must not hold up a cancelled scan.
            let acquired = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = self.limiter.clone().acquire_owned() => Some(permit),
            };
            let permit = match acquired {
                Some(Ok(permit)) => permit,
                Some(Err(_)) => {
                    slots[idx].1 = Some(ProbeResult::failed(protocol, "probe limiter closed"));
                    continue;
                }
                None => {
                    slots[idx].1 = Some(ProbeResult::failed(protocol, "scan cancelled"));
                    continue;
                }
            };
            let probe = probe.clone();
            let ctx = ProbeContext {
                domain: domain.clone(),
                config: self.config.clone(),
                http: self.http.clone(),
                cancel: cancel.child_token(),
            };

            let handle = set.spawn(async move {
                let _permit = permit; // keep permit until the probe settles
                let begin = Instant::now();
                let fallback = ProbeResult::not_detected(protocol);
                let guarded = guard::race(probe.probe(&ctx), fallback, deadline, &ctx.cancel).await;
                let mut result = match guarded {
                    Guarded::Completed(result) => result,
                    Guarded::TimedOut(fallback) => {
                        warn!(domain = %ctx.domain, %protocol, "probe exceeded {}ms", deadline.as_millis());
                        fallback.with_error(format!("probe timed out after {}ms", deadline.as_millis()))
                    }
                    Guarded::Cancelled(fallback) => fallback.with_error("scan cancelled"),
                };
                if result.error.is_some() {
                    result.confidence = Confidence::Low;
                }
                result.response_time_ms = Some(begin.elapsed().as_millis() as u64);
                result
            });
            task_slots.insert(handle.id(), idx);
        }

        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    if let Some(&idx) = task_slots.get(&id) {
                        slots[idx].1 = Some(result);
                    }
                }
                Err(err) => {
                    let Some(&idx) = task_slots.get(&err.id()) else {
                        continue;
                    };
                    let protocol = slots[idx].0;
                    let message = if err.is_panic() {
                        panic_message(err.into_panic())
                    } else {
                        "probe task was cancelled".to_string()
                    };
                    warn!(%domain, %protocol, error = %message, "probe panicked");
                    slots[idx].1 = Some(ProbeResult::failed(protocol, message));
                }
            }
        }

        let results: Vec<ProbeResult> = slots
            .into_iter()
            .map(|(protocol, result)| {
                result.unwrap_or_else(|| ProbeResult::failed(protocol, "probe produced no result"))
            })
            .collect();

        let detected: Vec<Protocol> = results
            .iter()
            .filter(|r| r.is_detected())
            .map(|r| r.protocol)
            .collect();
        info!(
            %domain,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ?detected,
            "scan finished"
        );
        debug!(%domain, results = results.len(), "results aggregated");
        results
    }
}

/// Current UTC time as an RFC 3339 string, for report envelopes.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "probe panicked".to_string()
    }
}
