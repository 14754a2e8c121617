use std::fs::File;
use std::path::{Path, PathBuf};

use agentic_commerce_scan::config::{self, Scheme};
use agentic_commerce_scan::types::{Protocol, ScanReport};
use agentic_commerce_scan::{now_rfc3339, telemetry, ScanConfig, Scanner};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// agentic-commerce-scan: probe storefront domains for agentic commerce payment protocols.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "agentic-commerce-scan",
    version,
    about = "Probe storefront domains for agentic commerce payment protocols (UCP, ACP, x402, AP2, MCP, NLWeb, Visa VIC, Mastercard Agent Pay).",
    long_about = None
)]
struct Cli {
    /// Domains to scan (bare host names; a leading scheme is stripped).
    #[arg(required = true)]
    domains: Vec<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long = "timeout-ms", env = config::ENV_TIMEOUT_MS, default_value_t = config::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// User-Agent header sent with every probe request.
    #[arg(long = "user-agent", env = config::ENV_USER_AGENT, default_value = config::DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Pause between consecutive domains, in milliseconds.
    #[arg(long = "rate-limit-delay-ms", env = config::ENV_RATE_LIMIT_DELAY_MS, default_value_t = config::DEFAULT_RATE_LIMIT_DELAY_MS)]
    rate_limit_delay_ms: u64,

    /// Advisory request budget per domain, recorded in the config.
    #[arg(long = "max-requests-per-domain", env = config::ENV_MAX_REQUESTS_PER_DOMAIN, default_value_t = config::DEFAULT_MAX_REQUESTS_PER_DOMAIN)]
    max_requests_per_domain: u32,

    /// Max probes in flight at once.
    #[arg(long = "max-concurrent-probes", env = config::ENV_MAX_CONCURRENT_PROBES, default_value_t = config::DEFAULT_MAX_CONCURRENT_PROBES)]
    max_concurrent_probes: usize,

    /// Comma-separated subset of protocols to probe (default: all).
    #[arg(long, env = config::ENV_PROTOCOLS, value_delimiter = ',')]
    protocols: Vec<Protocol>,

    /// Use plain HTTP instead of HTTPS (local test servers only).
    #[arg(long = "plain-http", default_value_t = false, hide = true)]
    plain_http: bool,

    /// Print reports as JSON on stdout instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Write reports as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut protocols = if self.protocols.is_empty() {
            Protocol::ALL.to_vec()
        } else {
            self.protocols.clone()
        };
        protocols.sort();
        protocols.dedup();

        let config = ScanConfig {
            timeout_ms: self.timeout_ms,
            user_agent: self.user_agent.clone(),
            rate_limit_delay_ms: self.rate_limit_delay_ms,
            max_requests_per_domain: self.max_requests_per_domain,
            max_concurrent_probes: self.max_concurrent_probes,
            protocols,
            scheme: if self.plain_http { Scheme::Http } else { Scheme::Https },
        };
        config.validate().context("invalid scan configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; flags and the real environment still apply.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init();

    let config = cli.scan_config()?;
    let delay = config.rate_limit_delay();
    info!(
        domains = cli.domains.len(),
        protocols = ?config.protocols,
        timeout_ms = config.timeout_ms,
        "starting scan"
    );
    let scanner = Scanner::new(config).context("failed to set up scanner")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling scan");
                cancel.cancel();
            }
        });
    }

    let mut reports = Vec::with_capacity(cli.domains.len());
    for (i, domain) in cli.domains.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            warn!(%domain, "skipped after interrupt");
            break;
        }
        let host = agentic_commerce_scan::url::normalize_host(domain);
        let scanned_at = now_rfc3339();
        let results = scanner.run_probes_with_cancel(host, cancel.child_token()).await;
        let report = ScanReport::new(host, scanned_at, results);
        if !cli.json {
            print_report_table(&report);
        }
        reports.push(report);
    }

    if cli.json {
        let out = serde_json::to_string_pretty(&reports).context("failed to encode reports")?;
        println!("{out}");
    }
    if let Some(path) = cli.output.as_deref() {
        write_reports_json(path, &reports)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        info!(path = %path.display(), "wrote JSON reports");
    }

    Ok(())
}

fn print_report_table(report: &ScanReport) {
    let proto_w = "protocol".len().max(
        report
            .results
            .iter()
            .map(|r| r.protocol.as_str().len())
            .max()
            .unwrap_or(0),
    );
    let status_w = "platform_enabled".len();
    let conf_w = "confidence".len();
    let time_w = "time_ms".len();
    let mut method_w = "method".len();
    for r in &report.results {
        if let Some(m) = r.detection_method.as_ref().or(r.error.as_ref()) {
            method_w = method_w.max(m.len().min(48));
        }
    }

    let detected = if report.detected.is_empty() {
        "none".to_string()
    } else {
        report
            .detected
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("\n{} (scanned: {})", report.domain, report.scanned_at);
    println!("Detected: {detected}");
    println!(
        "{:<proto_w$}  {:<status_w$}  {:<conf_w$}  {:<method_w$}  {:>time_w$}",
        "protocol", "status", "confidence", "method", "time_ms",
    );
    println!(
        "{:-<proto_w$}  {:-<status_w$}  {:-<conf_w$}  {:-<method_w$}  {:->time_w$}",
        "", "", "", "", "",
    );
    for r in &report.results {
        let mut method = r
            .detection_method
            .clone()
            .or_else(|| r.error.clone())
            .unwrap_or_default();
        if method.len() > 48 {
            let mut cut = 48;
            while !method.is_char_boundary(cut) {
                cut -= 1;
            }
            method.truncate(cut);
        }
        let time = r
            .response_time_ms
            .map(|ms| ms.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<proto_w$}  {:<status_w$}  {:<conf_w$}  {:<method_w$}  {:>time_w$}",
            r.protocol.as_str(),
            r.status.as_str(),
            r.confidence.as_str(),
            method,
            time,
        );
    }
}

fn write_reports_json(path: &Path, reports: &[ScanReport]) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, reports)?;
    Ok(())
}
