// src/lib.rs
// Public library surface for scrapers, the binary and integration tests.

pub mod authority;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dates;
pub mod fetch;
pub mod item;
pub mod pipeline;
pub mod relevance;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use cache::{CacheStats, Headers, RateLimitCache, ResponseCache};
pub use config::CrawlerConfig;
pub use dates::{is_recent, normalize, DateExtractor, DateStrategy, NormalizedDate};
pub use fetch::CachedFetcher;
pub use item::ContentItem;
pub use pipeline::{crawl_and_rank, run_sources, SourceCrawler, SourceOutcome};
pub use relevance::{KeywordCategory, KeywordTable, RelevanceScorer, ScoreBreakdown};
