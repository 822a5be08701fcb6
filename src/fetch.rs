// src/fetch.rs
//! Fetch-or-serve-cached HTTP client used by scrapers.
//!
//! Order per request: cache → per-domain rate-limit check → inter-request delay →
//! GET. 429/503 answers are remembered per domain (honouring `Retry-After`).

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{Headers, RateLimitCache, ResponseCache};
use crate::config::CrawlerConfig;
use crate::dates::parse_lenient;
use crate::telemetry::describe_metrics;

const GITHUB_API_HOST: &str = "api.github.com";

pub struct CachedFetcher {
    http: reqwest::Client,
    cache: Option<Arc<ResponseCache>>,
    rate_limits: Arc<RateLimitCache>,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
    github_token: Option<String>,
}

impl CachedFetcher {
    /// Client with the configured timeout and user agent. `cache = None` always goes to the network.
    pub fn new(cfg: &CrawlerConfig, cache: Option<Arc<ResponseCache>>) -> Result<Self> {
        describe_metrics();
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.timeout())
            .timeout(cfg.timeout())
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            cache: if cfg.enable_caching { cache } else { None },
            rate_limits: Arc::new(RateLimitCache::new()),
            delay: cfg.request_delay(),
            last_request: Mutex::new(None),
            github_token: cfg.github_token.clone(),
        })
    }

    /// Share one rate-limit table across fetchers.
    pub fn with_rate_limits(mut self, rate_limits: Arc<RateLimitCache>) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitCache> {
        &self.rate_limits
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub async fn fetch(&self, url: &str, headers: &Headers) -> Result<String> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(url, headers)) {
            debug!(target: "fetch", url, "served from cache");
            return Ok(hit);
        }

        let parsed = url::Url::parse(url).with_context(|| format!("invalid url {url}"))?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| anyhow!("url without host: {url}"))?
            .to_ascii_lowercase();

        if self.rate_limits.is_rate_limited(&domain) {
            counter!("fetch_rate_limited_total").increment(1);
            let wait = self.rate_limits.wait_time(&domain);
            bail!("{domain} is rate limited for another {}s", wait.as_secs());
        }

        self.pace().await;

        let mut req = self.http.get(parsed.clone()).headers(to_header_map(headers)?);
        if domain == GITHUB_API_HOST && !headers.keys().any(|k| k.eq_ignore_ascii_case("authorization")) {
            if let Some(tok) = &self.github_token {
                req = req.header(AUTHORIZATION, format!("Bearer {tok}"));
            }
        }

        counter!("fetch_requests_total").increment(1);
        let resp = req.send().await.with_context(|| format!("GET {url}"))?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            self.rate_limits.record(&domain, status.as_u16(), retry_after);
            counter!("fetch_rate_limited_total").increment(1);
            warn!(target: "fetch", %domain, status = status.as_u16(), "rate limited by remote");
            bail!("GET {url} rate limited ({status})");
        }
        if !status.is_success() {
            bail!("GET {url} failed with {status}");
        }

        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        if let Some(cache) = &self.cache {
            cache.set(url, &body, headers, None);
        }
        debug!(target: "fetch", url, bytes = body.len(), "fetched");
        Ok(body)
    }

    /// Keep at least `delay` between consecutive requests of this fetcher.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes()).with_context(|| format!("header name {k}"))?;
        let value = HeaderValue::from_str(v).with_context(|| format!("header value for {k}"))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// `Retry-After` as delta-seconds or HTTP-date.
pub(crate) fn parse_retry_after(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = parse_lenient(raw)?;
    let secs = (at - Utc::now()).num_seconds().max(0);
    Some(Duration::from_secs(secs as u64))
}
