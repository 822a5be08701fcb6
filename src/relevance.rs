// src/relevance.rs
//! Relevance scoring for crawled AI/ML content.
//!
//! One canonical keyword table (five disjoint weighted categories plus a generic
//! catch-all list) lives here; scrapers never keep their own copies.
//!
//! Score = Σ category matches × weight + source authority + recency + engagement
//!       + research tag + generic term. Items scoring ≤ 0 are dropped by `rank`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::authority::SourceAuthority;
use crate::config::CrawlerConfig;
use crate::dates::NormalizedDate;
use crate::item::ContentItem;

pub const MAX_REASONS: usize = 4;
pub const MAX_KEYWORDS_PER_REASON: usize = 3;
pub const DEFAULT_HORIZON_DAYS: u32 = 365;

pub const RESEARCH_TAGS: &[&str] = &["research", "paper"];
pub const GENERIC_TERM_BONUS: f32 = 0.5;
pub const RESEARCH_TAG_BONUS: f32 = 1.0;
/// Reasons list "Recent content" from this recency bonus up.
pub const RECENT_REASON_MIN_BONUS: f32 = 1.5;
/// Reasons list engagement above this star count.
pub const ENGAGEMENT_REASON_MIN_STARS: u64 = 500;

/* ----------------------------
Keyword categories
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeywordCategory {
    Multimodal,
    AiAgent,
    EnergyAi,
    HighValue,
    Company,
}

impl KeywordCategory {
    /// Table order; also the disjointness priority and reason order.
    pub const ALL: [KeywordCategory; 5] = [
        KeywordCategory::Multimodal,
        KeywordCategory::AiAgent,
        KeywordCategory::EnergyAi,
        KeywordCategory::HighValue,
        KeywordCategory::Company,
    ];

    pub fn weight(self) -> f32 {
        match self {
            KeywordCategory::Multimodal => 2.0,
            KeywordCategory::AiAgent => 2.0,
            KeywordCategory::EnergyAi => 2.5,
            KeywordCategory::HighValue => 1.5,
            KeywordCategory::Company => 1.0,
        }
    }

    /// Reason prefix; company matches score but are not listed as a reason.
    pub fn reason_label(self) -> Option<&'static str> {
        match self {
            KeywordCategory::Multimodal => Some("Multimodal AI"),
            KeywordCategory::AiAgent => Some("AI Agents"),
            KeywordCategory::EnergyAi => Some("Energy AI"),
            KeywordCategory::HighValue => Some("Key Tech"),
            KeywordCategory::Company => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

const SEED_MULTIMODAL: &[&str] = &[
    "multimodal", "vision language model", "vlm", "clip", "dall-e",
    "gpt-4v", "gpt-4o", "gpt-4", "claude-3", "claude 3", "gemini pro vision", "llava",
    "visual question answering", "image captioning", "vision transformer",
    "text-to-image", "image-to-text", "visual reasoning", "multimodal ai",
    "vision-language", "visual language", "image understanding", "computer vision",
    "stable diffusion", "midjourney", "imagen", "blip", "flamingo", "kosmos",
    "visual ai", "image generation", "video understanding", "cross-modal",
];

const SEED_AI_AGENT: &[&str] = &[
    "ai agent", "autonomous agent", "intelligent agent", "agentic ai",
    "agent framework", "multi-agent", "agent planning", "tool use",
    "function calling", "reasoning agent", "agent orchestration",
    "langchain", "autogen", "crewai", "agent workflow", "agentic system",
    "agent collaboration", "agent architecture", "agent reasoning",
    "autonomous system", "ai assistant", "chatbot", "conversational ai",
    "task automation", "workflow automation", "decision making", "planning",
];

const SEED_ENERGY_AI: &[&str] = &[
    "energy ai", "smart grid", "energy management", "power systems ai",
    "renewable energy optimization", "energy forecasting", "demand response",
    "energy trading", "grid optimization", "energy efficiency ai",
    "power grid automation", "energy storage optimization", "microgrid",
    "energy analytics", "predictive maintenance energy", "carbon optimization",
    "energy digital twin", "smart meter", "energy iot", "energy blockchain",
    "energy market", "power system automation", "energy data analytics",
    "sustainability ai", "climate ai", "renewable energy", "carbon footprint",
];

const SEED_HIGH_VALUE: &[&str] = &[
    "gpt-4o", "gpt-4v", "claude-3", "gemini pro vision", "dall-e 3",
    "midjourney", "stable diffusion", "llava", "blip", "flamingo",
    "palm-e", "kosmos", "bard", "chatgpt", "copilot", "langchain",
    "autogen", "crewai", "semantic kernel", "llm", "transformer",
    "attention mechanism", "reinforcement learning", "fine-tuning",
];

const SEED_COMPANY: &[&str] = &[
    "openai", "anthropic", "meta", "google", "microsoft", "deepmind",
    "hugging face", "nvidia", "stability ai", "cohere", "inflection",
];

const SEED_GENERIC: &[&str] = &[
    "artificial intelligence", "machine learning", "deep learning",
    "neural network", "ai", "ml", "llm", "gpt", "claude", "gemini",
];

/// Keyword overrides as they appear in config (`[keywords]` table).
/// Absent lists keep the built-in seed.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct KeywordsConfig {
    pub multimodal: Option<Vec<String>>,
    pub ai_agent: Option<Vec<String>>,
    pub energy_ai: Option<Vec<String>>,
    pub high_value: Option<Vec<String>>,
    pub company: Option<Vec<String>>,
    pub generic: Option<Vec<String>>,
}

/// Canonical keyword table: lowercased, deduplicated, categories disjoint.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordTable {
    categories: [Vec<String>; 5],
    generic: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn clean_list(list: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    list.into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

impl KeywordTable {
    /// Build from raw lists (in [`KeywordCategory::ALL`] order).
    /// A keyword stays only in the first category that lists it.
    pub fn new(categories: [Vec<String>; 5], generic: Vec<String>) -> Self {
        let mut claimed: HashSet<String> = HashSet::new();
        let categories = categories.map(|list| {
            clean_list(list)
                .into_iter()
                .filter(|k| claimed.insert(k.clone()))
                .collect::<Vec<_>>()
        });
        Self {
            categories,
            generic: clean_list(generic),
        }
    }

    pub fn default_seed() -> Self {
        Self::new(
            [
                owned(SEED_MULTIMODAL),
                owned(SEED_AI_AGENT),
                owned(SEED_ENERGY_AI),
                owned(SEED_HIGH_VALUE),
                owned(SEED_COMPANY),
            ],
            owned(SEED_GENERIC),
        )
    }

    /// Seed with config overrides applied per list.
    pub fn from_config(cfg: &KeywordsConfig) -> Self {
        let pick = |over: &Option<Vec<String>>, seed: &[&str]| {
            over.clone().unwrap_or_else(|| owned(seed))
        };
        Self::new(
            [
                pick(&cfg.multimodal, SEED_MULTIMODAL),
                pick(&cfg.ai_agent, SEED_AI_AGENT),
                pick(&cfg.energy_ai, SEED_ENERGY_AI),
                pick(&cfg.high_value, SEED_HIGH_VALUE),
                pick(&cfg.company, SEED_COMPANY),
            ],
            pick(&cfg.generic, SEED_GENERIC),
        )
    }

    /// Parse a standalone keywords TOML (top-level lists named like [`KeywordsConfig`]).
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: KeywordsConfig = toml::from_str(toml_str)?;
        Ok(Self::from_config(&cfg))
    }

    pub fn keywords(&self, cat: KeywordCategory) -> &[String] {
        &self.categories[cat.index()]
    }

    pub fn generic_terms(&self) -> &[String] {
        &self.generic
    }

    /// Distinct keywords of `cat` occurring in `blob` (already lowercased), in table order.
    pub fn matches(&self, cat: KeywordCategory, blob: &str) -> Vec<String> {
        self.keywords(cat)
            .iter()
            .filter(|k| blob.contains(k.as_str()))
            .cloned()
            .collect()
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::default_seed()
    }
}

/* ----------------------------
Score breakdown
---------------------------- */

/// Per-component score of one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Matched keywords per category, in [`KeywordCategory::ALL`] order.
    pub matched: Vec<(KeywordCategory, Vec<String>)>,
    pub keywords: f32,
    pub authority: f32,
    pub recency: f32,
    pub engagement: f32,
    pub research: f32,
    pub generic: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.keywords + self.authority + self.recency + self.engagement + self.research + self.generic
    }

    pub fn matched_in(&self, cat: KeywordCategory) -> &[String] {
        self.matched
            .iter()
            .find(|(c, _)| *c == cat)
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }
}

/// Step function of calendar age; `horizon_days` caps the last (0.5) tier.
pub fn recency_bonus(date: &NormalizedDate, now: DateTime<Utc>, horizon_days: u32) -> f32 {
    let Some(age) = date.age_days_at(now) else {
        return 0.0;
    };
    match age {
        a if a <= 7 => 2.0,
        a if a <= 30 => 1.8,
        a if a <= 90 => 1.5,
        a if a <= 180 => 1.0,
        a if a <= i64::from(horizon_days) => 0.5,
        _ => 0.0,
    }
}

/// `min(2, stars/1000) + min(1, forks/100)`; repository sources only.
pub fn engagement_bonus(item: &ContentItem) -> f32 {
    if !item.is_repository_source() {
        return 0.0;
    }
    let stars = item.stars.unwrap_or(0) as f32;
    let forks = item.forks.unwrap_or(0) as f32;
    (stars / 1000.0).min(2.0) + (forks / 100.0).min(1.0)
}

/// Terms this short only count as whole words ("ai" must not hit "detailed").
pub const SHORT_TERM_MAX_LEN: usize = 2;

/// Substring match, except short terms need non-alphanumeric neighbours.
fn contains_generic(blob: &str, term: &str) -> bool {
    if term.chars().count() > SHORT_TERM_MAX_LEN {
        return blob.contains(term);
    }
    blob.match_indices(term).any(|(i, m)| {
        let before = blob[..i].chars().next_back();
        let after = blob[i + m.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

fn text_blob(item: &ContentItem) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3 + item.tags.len());
    for s in [&item.title, &item.summary, &item.content] {
        if !s.is_empty() {
            parts.push(s);
        }
    }
    parts.extend(item.tags.iter().map(String::as_str));
    parts.join(" ").to_lowercase()
}

/* ----------------------------
Scorer
---------------------------- */

#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    table: KeywordTable,
    authority: SourceAuthority,
    horizon_days: u32,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(KeywordTable::default_seed(), SourceAuthority::default_seed())
    }
}

impl RelevanceScorer {
    pub fn new(table: KeywordTable, authority: SourceAuthority) -> Self {
        Self {
            table,
            authority,
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }

    /// Items older than this get no recency bonus at all.
    pub fn with_horizon_days(mut self, days: u32) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn from_config(cfg: &CrawlerConfig) -> Self {
        let table = cfg
            .keywords
            .as_ref()
            .map(KeywordTable::from_config)
            .unwrap_or_default();
        let authority = cfg.authority.clone().unwrap_or_default();
        Self::new(table, authority).with_horizon_days(cfg.max_days_back)
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn authority(&self) -> &SourceAuthority {
        &self.authority
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn explain_at(&self, item: &ContentItem, now: DateTime<Utc>) -> ScoreBreakdown {
        let blob = text_blob(item);

        let matched: Vec<(KeywordCategory, Vec<String>)> = KeywordCategory::ALL
            .iter()
            .map(|&c| (c, self.table.matches(c, &blob)))
            .collect();
        let keywords: f32 = matched
            .iter()
            .map(|(c, m)| m.len() as f32 * c.weight())
            .sum();

        let research = if item.tags.iter().any(|t| {
            let t = t.trim();
            RESEARCH_TAGS.iter().any(|r| t.eq_ignore_ascii_case(r))
        }) {
            RESEARCH_TAG_BONUS
        } else {
            0.0
        };

        let generic = if self
            .table
            .generic_terms()
            .iter()
            .any(|g| contains_generic(&blob, g))
        {
            GENERIC_TERM_BONUS
        } else {
            0.0
        };

        ScoreBreakdown {
            matched,
            keywords,
            authority: self.authority.boost_for(&item.source),
            recency: recency_bonus(&item.date, now, self.horizon_days),
            engagement: engagement_bonus(item),
            research,
            generic,
        }
    }

    pub fn score_at(&self, item: &ContentItem, now: DateTime<Utc>) -> f32 {
        self.explain_at(item, now).total()
    }

    pub fn score(&self, item: &ContentItem) -> f32 {
        self.score_at(item, Utc::now())
    }

    /// Human-readable reasons: topical categories, then recency, then engagement; max 4.
    pub fn reasons(&self, item: &ContentItem, b: &ScoreBreakdown) -> Vec<String> {
        let mut out: Vec<String> = b
            .matched
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .filter_map(|(c, m)| {
                c.reason_label().map(|label| {
                    let shown: Vec<&str> = m
                        .iter()
                        .take(MAX_KEYWORDS_PER_REASON)
                        .map(String::as_str)
                        .collect();
                    format!("{label}: {}", shown.join(", "))
                })
            })
            .collect();

        if b.recency >= RECENT_REASON_MIN_BONUS {
            out.push("Recent content".to_string());
        }
        if item.is_repository_source() {
            if let Some(stars) = item.stars.filter(|s| *s > ENGAGEMENT_REASON_MIN_STARS) {
                out.push(format!("High engagement ({stars} stars)"));
            }
        }
        out.truncate(MAX_REASONS);
        out
    }

    /// Score, annotate, drop non-positive, stable-sort descending.
    pub fn rank_at(&self, items: Vec<ContentItem>, now: DateTime<Utc>) -> Vec<ContentItem> {
        let total = items.len();
        let mut kept: Vec<ContentItem> = items
            .into_iter()
            .filter_map(|mut item| {
                let b = self.explain_at(&item, now);
                let score = b.total();
                if score <= 0.0 {
                    return None;
                }
                item.relevance_reasons = self.reasons(&item, &b);
                item.relevance_score = score;
                debug!(target: "relevance", url = %item.url, score, reasons = ?item.relevance_reasons, "scored");
                Some(item)
            })
            .collect();

        // sort_by is stable: equal scores keep input order.
        kept.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        info!(target: "relevance", total, kept = kept.len(), dropped = total - kept.len(), "ranked");
        kept
    }

    pub fn rank(&self, items: Vec<ContentItem>) -> Vec<ContentItem> {
        self.rank_at(items, Utc::now())
    }
}
