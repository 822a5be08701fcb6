// src/pipeline.rs
//! Fan-out / fan-in over per-source crawlers.
//!
//! Each source runs in its own tokio task. A failing or panicking source turns
//! into an empty result plus a warning; its siblings are unaffected.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CrawlerConfig;
use crate::dates::is_recent_at;
use crate::item::ContentItem;
use crate::relevance::RelevanceScorer;
use crate::telemetry::describe_metrics;

/// One content source (blog, feed, repository search, ...).
#[async_trait]
pub trait SourceCrawler: Send + Sync {
    fn name(&self) -> &str;
    async fn crawl(&self) -> Result<Vec<ContentItem>>;
}

/// What one source produced.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: String,
    pub items: Vec<ContentItem>,
    /// Set when the task failed or panicked (`items` is then empty).
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Run every crawler concurrently; outcomes come back in input order.
pub async fn run_sources(crawlers: &[Arc<dyn SourceCrawler>]) -> Vec<SourceOutcome> {
    describe_metrics();

    let handles: Vec<_> = crawlers
        .iter()
        .map(|c| {
            let c = Arc::clone(c);
            let name = c.name().to_string();
            (name, tokio::spawn(async move { c.crawl().await }))
        })
        .collect();

    let mut out = Vec::with_capacity(handles.len());
    for (source, handle) in handles {
        let outcome = match handle.await {
            Ok(Ok(items)) => SourceOutcome {
                source,
                items,
                error: None,
            },
            Ok(Err(e)) => {
                warn!(target: "pipeline", error = ?e, source = %source, "source crawl failed");
                counter!("pipeline_source_errors_total").increment(1);
                SourceOutcome {
                    source,
                    items: Vec::new(),
                    error: Some(format!("{e:#}")),
                }
            }
            Err(join_err) => {
                warn!(target: "pipeline", error = %join_err, source = %source, "source task panicked or was cancelled");
                counter!("pipeline_source_errors_total").increment(1);
                SourceOutcome {
                    source,
                    items: Vec::new(),
                    error: Some(join_err.to_string()),
                }
            }
        };
        out.push(outcome);
    }
    out
}

/// Keep recent items (unknown dates included) and drop repeated URLs (first wins).
pub fn filter_recent_unique(
    items: Vec<ContentItem>,
    max_days_back: u32,
    now: DateTime<Utc>,
) -> Vec<ContentItem> {
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|it| is_recent_at(&it.date, max_days_back, now))
        .filter(|it| {
            let url = it.url.trim();
            url.is_empty() || seen.insert(url.to_string())
        })
        .collect()
}

/// Crawl all sources, cap each at `max_results_per_source`, filter, dedup and rank.
pub async fn crawl_and_rank_at(
    crawlers: &[Arc<dyn SourceCrawler>],
    scorer: &RelevanceScorer,
    cfg: &CrawlerConfig,
    now: DateTime<Utc>,
) -> Vec<ContentItem> {
    let outcomes = run_sources(crawlers).await;
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();

    let collected: Vec<ContentItem> = outcomes
        .into_iter()
        .flat_map(|o| o.items.into_iter().take(cfg.max_results_per_source))
        .collect();
    let collected_n = collected.len();

    let candidates = filter_recent_unique(collected, cfg.max_days_back, now);
    let ranked = scorer.rank_at(candidates, now);

    counter!("pipeline_items_ranked_total").increment(ranked.len() as u64);
    info!(
        target: "pipeline",
        sources = crawlers.len(),
        failed,
        collected = collected_n,
        ranked = ranked.len(),
        "crawl finished"
    );
    ranked
}

pub async fn crawl_and_rank(
    crawlers: &[Arc<dyn SourceCrawler>],
    scorer: &RelevanceScorer,
    cfg: &CrawlerConfig,
) -> Vec<ContentItem> {
    crawl_and_rank_at(crawlers, scorer, cfg, Utc::now()).await
}
