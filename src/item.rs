// src/item.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dates::NormalizedDate;

/// One crawled article / post / repository, as handed to the scorer.
///
/// Passive record. `relevance_score` and `relevance_reasons` are filled in by
/// [`crate::relevance::RelevanceScorer::rank`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContentItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub date: NormalizedDate,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forks: Option<u64>,
    #[serde(default)]
    pub relevance_score: f32,
    #[serde(default)]
    pub relevance_reasons: Vec<String>,
}

impl ContentItem {
    pub fn new(title: &str, url: &str, source: &str) -> Self {
        Self {
            title: normalize_text(title),
            url: url.trim().to_string(),
            source: source.trim().to_string(),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: NormalizedDate) -> Self {
        self.date = date;
        self
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = normalize_text(summary);
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = normalize_text(content);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags
            .into_iter()
            .map(Into::into)
            .map(|t: String| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn with_engagement(mut self, stars: Option<u64>, forks: Option<u64>) -> Self {
        self.stars = stars;
        self.forks = forks;
        self
    }

    /// Repository hosts are the only sources whose stars/forks count.
    pub fn is_repository_source(&self) -> bool {
        let s = self.source.to_lowercase();
        s.contains("github") || s.contains("gitlab")
    }
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

/// Decode entities, strip tags, straighten typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    RE_WS.replace_all(&quoted, " ").trim().to_string()
}
