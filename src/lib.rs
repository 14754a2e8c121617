//! Library crate for agentic-commerce-scan: probes a domain for the agentic
//! commerce payment protocols it exposes.
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod probes;
pub mod scanner;
pub mod signals;
pub mod telemetry;
pub mod types;
pub mod url;

pub use config::ScanConfig;
pub use error::{ConfigError, ProbeError, ScanError};
pub use probes::{ProbeContext, ProbeRegistry, ProtocolProbe};
pub use scanner::{now_rfc3339, run_probes, Scanner};
pub use types::{Confidence, ProbeResult, ProbeStatus, Protocol, ScanReport};
