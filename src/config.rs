// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::authority::SourceAuthority;
use crate::relevance::KeywordsConfig;

pub const ENV_CONFIG_PATH: &str = "CRAWLER_CONFIG_PATH";
pub const ENV_MAX_DAYS_BACK: &str = "CRAWLER_MAX_DAYS_BACK";
pub const ENV_CACHE_DIR: &str = "CRAWLER_CACHE_DIR";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const DEFAULT_CONFIG_PATH: &str = "config/crawler.toml";

/// Crawler settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrawlerConfig {
    pub max_results_per_source: usize,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub enable_caching: bool,
    pub cache_dir: PathBuf,
    /// 15 days.
    pub cache_ttl_secs: u64,
    pub max_cache_size_mb: u64,
    /// Recency window for filtering, and the horizon of the oldest recency tier.
    pub max_days_back: u32,
    pub github_token: Option<String>,
    pub keywords: Option<KeywordsConfig>,
    pub authority: Option<SourceAuthority>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_results_per_source: 25,
            request_delay_ms: 100,
            timeout_secs: 10,
            user_agent: "AI-Research-Crawler/1.0".to_string(),
            enable_caching: true,
            cache_dir: PathBuf::from("cache"),
            cache_ttl_secs: 1_296_000,
            max_cache_size_mb: 100,
            max_days_back: 365,
            github_token: None,
            keywords: None,
            authority: None,
        }
    }
}

impl CrawlerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing crawler config TOML")
    }

    /// Load from an explicit path (no env overrides).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading crawler config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Resolve config the usual way, then apply env overrides:
    /// 1) $CRAWLER_CONFIG_PATH (must exist)
    /// 2) config/crawler.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                ));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// `CRAWLER_MAX_DAYS_BACK`, `CRAWLER_CACHE_DIR`, `GITHUB_TOKEN`. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_MAX_DAYS_BACK) {
            match raw.trim().parse::<u32>() {
                Ok(v) => self.max_days_back = v,
                Err(_) => warn!(value = %raw, "ignoring invalid {ENV_MAX_DAYS_BACK}"),
            }
        }
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            if !dir.trim().is_empty() {
                self.cache_dir = PathBuf::from(dir.trim());
            }
        }
        if let Ok(tok) = std::env::var(ENV_GITHUB_TOKEN) {
            if !tok.trim().is_empty() {
                self.github_token = Some(tok.trim().to_string());
            }
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn max_cache_size_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(1024 * 1024)
    }
}
