#![allow(dead_code)]

use agentic_commerce_scan::config::Scheme;
use agentic_commerce_scan::ScanConfig;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

pub const PLAIN_HOMEPAGE: &str =
    "<!doctype html><html><head><title>Shop</title></head><body><h1>Welcome</h1></body></html>";

/// Serve `router` on an ephemeral local port and return its `host:port`.
pub async fn spawn_fixture(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture");
    let addr = listener.local_addr().expect("fixture addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fixture server");
    });
    addr.to_string()
}

/// A router that only serves a plain homepage; everything else is 404.
pub fn plain_site() -> Router {
    Router::new().route("/", get(|| async { Html(PLAIN_HOMEPAGE) }))
}

/// A `host:port` nothing is listening on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    addr.to_string()
}

pub fn fixture_config() -> ScanConfig {
    ScanConfig {
        timeout_ms: 2_000,
        rate_limit_delay_ms: 0,
        scheme: Scheme::Http,
        ..ScanConfig::default()
    }
}
