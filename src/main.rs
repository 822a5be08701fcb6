//! ai-ml-crawler — rank a batch of crawled items.
//!
//! Usage: `ai-ml-crawler <items.json>` (a JSON array of content items; `-` reads stdin).
//! Prints the ranked, annotated items as JSON on stdout.
//!
//! Env: `CRAWLER_CONFIG_PATH`, `CRAWLER_MAX_DAYS_BACK`, `CRAWLER_CACHE_DIR`,
//! `GITHUB_TOKEN`, `RUST_LOG`, `CRAWLER_LOG_FORMAT=json`, `CRAWLER_METRICS=1`.

use ai_ml_crawler::pipeline::filter_recent_unique;
use ai_ml_crawler::telemetry::{init_tracing, Metrics};
use ai_ml_crawler::{ContentItem, CrawlerConfig, RelevanceScorer};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use metrics::counter;
use std::io::Read;
use tracing::info;

fn read_input(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading items from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(arg).with_context(|| format!("reading items from {arg}"))
}

fn main() -> Result<()> {
    // Load .env in local/dev; harmless when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = if std::env::var("CRAWLER_METRICS").ok().as_deref() == Some("1") {
        Some(Metrics::install()?)
    } else {
        None
    };

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: ai-ml-crawler <items.json | ->");
    };

    let cfg = CrawlerConfig::load_default()?;
    let items: Vec<ContentItem> =
        serde_json::from_str(&read_input(&path)?).context("parsing items JSON array")?;

    let now = Utc::now();
    let total = items.len();
    let candidates = filter_recent_unique(items, cfg.max_days_back, now);
    let scorer = RelevanceScorer::from_config(&cfg);
    let ranked = scorer.rank_at(candidates, now);
    counter!("pipeline_items_ranked_total").increment(ranked.len() as u64);

    info!(total, ranked = ranked.len(), max_days_back = cfg.max_days_back, "ranking done");
    println!("{}", serde_json::to_string_pretty(&ranked)?);

    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    Ok(())
}
