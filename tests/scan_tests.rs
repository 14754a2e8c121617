mod common;

use std::sync::Arc;

use agentic_commerce_scan::{
    run_probes, Confidence, ProbeStatus, Protocol, ScanConfig, ScanReport, Scanner,
};
use axum::routing::{get, options};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::Semaphore;

use common::{closed_port, fixture_config, plain_site, spawn_fixture};

#[tokio::test]
async fn plain_site_is_clean_negative_for_every_protocol() {
    let host = spawn_fixture(plain_site()).await;
    let results = run_probes(&host, &fixture_config()).await;

    assert_eq!(
        results.iter().map(|r| r.protocol).collect::<Vec<_>>(),
        Protocol::ALL.to_vec()
    );
    for r in &results {
        assert_eq!(r.status, ProbeStatus::NotDetected, "{}", r.protocol);
        assert_eq!(r.confidence, Confidence::High, "{}", r.protocol);
        assert!(r.capabilities.is_empty(), "{}", r.protocol);
        assert!(r.error.is_none(), "{}: {:?}", r.protocol, r.error);
        assert!(r.response_time_ms.is_some());
    }
}

#[tokio::test]
async fn unreachable_domain_still_returns_one_result_per_protocol() {
    let host = closed_port().await;
    let results = run_probes(&host, &fixture_config()).await;

    assert_eq!(results.len(), Protocol::ALL.len());
    for (r, expected) in results.iter().zip(Protocol::ALL) {
        assert_eq!(r.protocol, expected);
        assert!(!r.is_detected());
        assert_eq!(r.confidence, Confidence::Low);
        assert!(r.error.is_some(), "{} should carry the transport error", r.protocol);
        assert!(r.capabilities.is_empty());
    }
}

#[tokio::test]
async fn protocol_subset_keeps_canonical_order() {
    let host = spawn_fixture(plain_site()).await;
    let config = ScanConfig {
        protocols: vec![Protocol::MastercardAgentpay, Protocol::X402, Protocol::Acp],
        ..fixture_config()
    };
    let results = run_probes(&host, &config).await;
    assert_eq!(
        results.iter().map(|r| r.protocol).collect::<Vec<_>>(),
        vec![Protocol::Acp, Protocol::X402, Protocol::MastercardAgentpay]
    );
}

fn multi_protocol_site() -> Router {
    common::plain_site()
        .route(
            "/checkout_sessions",
            options(|| async { ([("x-acp-version", "2024-01-01")], "") }),
        )
        .route(
            "/.well-known/mcp.json",
            get(|| async { Json(json!({"name": "shop", "tools": [{"name": "search"}]})) }),
        )
}

#[tokio::test]
async fn repeated_scans_are_identical_apart_from_timing() {
    let host = spawn_fixture(multi_protocol_site()).await;
    let scanner = Scanner::new(fixture_config()).expect("scanner");

    let mut first = scanner.run_probes(&host).await;
    let mut second = scanner.run_probes(&host).await;
    for r in first.iter_mut().chain(second.iter_mut()) {
        r.response_time_ms = None;
    }
    assert_eq!(first, second);
}

#[tokio::test]
async fn report_envelope_lists_detections() {
    let host = spawn_fixture(multi_protocol_site()).await;
    let results = run_probes(&host, &fixture_config()).await;
    let report = ScanReport::new(host.clone(), agentic_commerce_scan::now_rfc3339(), results);

    assert_eq!(report.detected, vec![Protocol::Acp, Protocol::Mcp]);

    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["domain"], json!(host));
    assert_eq!(v["detected"], json!(["acp", "mcp"]));
    assert_eq!(v["results"].as_array().unwrap().len(), 8);
    assert_eq!(v["results"][1]["status"], json!("confirmed"));
    assert_eq!(v["results"][0]["capabilities"], json!({}));
}

#[tokio::test]
async fn shared_limiter_of_one_still_completes_every_probe() {
    let host = spawn_fixture(multi_protocol_site()).await;
    let limiter = Arc::new(Semaphore::new(1));
    let a = Scanner::with_limiter(fixture_config(), limiter.clone()).expect("scanner a");
    let b = Scanner::with_limiter(fixture_config(), limiter.clone()).expect("scanner b");

    let (ra, rb) = tokio::join!(a.run_probes(&host), b.run_probes(&host));
    assert_eq!(ra.len(), 8);
    assert_eq!(rb.len(), 8);
    assert!(ra.iter().chain(rb.iter()).all(|r| r.error.is_none()));
    assert_eq!(limiter.available_permits(), 1);
}

#[tokio::test]
async fn invalid_config_is_rejected_by_scanner() {
    let config = ScanConfig {
        protocols: Vec::new(),
        ..fixture_config()
    };
    assert!(Scanner::new(config).is_err());
}
