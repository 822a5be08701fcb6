// src/telemetry.rs
//! Tracing subscriber setup, metric descriptions and the optional Prometheus recorder.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "ai_ml_crawler=info,warn";

/// Install the global subscriber (binary only; library code never calls this).
///
/// `RUST_LOG` overrides the default filter; `CRAWLER_LOG_FORMAT=json` switches to JSON lines.
/// A second call is a no-op.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let json = std::env::var("CRAWLER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
    if res.is_err() {
        // Already installed (tests, embedding apps): keep theirs.
    }
}

/// Register metric descriptions once per process.
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_hits_total", "Cache lookups served from memory or disk.");
        describe_counter!("cache_misses_total", "Cache lookups that found nothing usable.");
        describe_counter!(
            "cache_evictions_total",
            "Entries evicted to stay under the byte budget."
        );
        describe_counter!("cache_expired_total", "Entries purged after their TTL ran out.");
        describe_gauge!("cache_size_bytes", "Resident cache size in bytes.");
        describe_counter!("fetch_requests_total", "Outbound HTTP requests issued.");
        describe_counter!(
            "fetch_rate_limited_total",
            "Requests refused or answered with 429/503."
        );
        describe_counter!(
            "pipeline_source_errors_total",
            "Source crawl tasks that failed or panicked."
        );
        describe_counter!(
            "pipeline_items_ranked_total",
            "Items that survived filtering and ranking."
        );
    });
}

/// Prometheus recorder handle; `render()` gives the exposition text.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_metrics();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
