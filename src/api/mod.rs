//! HTTP API Module
//!
//! Serves the Prometheus scrape endpoint and a few JSON views.

pub mod collector;
pub mod metrics;
mod routes;

pub use collector::ScrapeCollector;
pub use metrics::ExporterStats;
pub use routes::{run_api_server, ApiState};
