//! # Source Authority
//!
//! Flat score boost for items published by a small set of top-tier AI labs.
//!
//! - Case-insensitive lookup with punctuation, dashes and URL separators folded to spaces.
//! - Aliases map alternative spellings ("Open AI", "Facebook AI Research") to a canonical lab.
//! - Fallback order: alias → exact → substring containment → no boost.
//! - Built-in `default_seed()`; overridable from the `[authority]` config table.

use serde::Deserialize;
use std::collections::HashMap;

fn default_boost() -> f32 {
    2.0
}

/// Top-tier source table.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceAuthority {
    /// Bonus added when the source resolves to a top-tier lab.
    #[serde(default = "default_boost")]
    pub boost: f32,
    /// Canonical lab names.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Alias → canonical name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Default for SourceAuthority {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceAuthority {
    /// OpenAI, Anthropic and Meta with their common aliases.
    pub fn default_seed() -> Self {
        let sources = ["openai", "anthropic", "meta"]
            .into_iter()
            .map(String::from)
            .collect();

        let mut aliases = HashMap::new();
        for (a, c) in [
            ("open ai", "openai"),
            ("anthropic pbc", "anthropic"),
            ("meta ai", "meta"),
            ("meta platforms", "meta"),
            ("facebook ai", "meta"),
            ("facebook research", "meta"),
            ("facebook ai research", "meta"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            boost: default_boost(),
            sources,
            aliases,
        }
    }

    /// Canonical top-tier name for a source, if any.
    pub fn canonical_for(&self, source: &str) -> Option<String> {
        let s = normalize(source);
        if s.is_empty() {
            return None;
        }
        let known = |c: &str| self.sources.iter().any(|k| normalize(k) == c);

        // 1) Alias resolution (exact, then whole-word inside the source).
        for (alias, canon) in &self.aliases {
            let a = normalize(alias);
            if !a.is_empty() && (s == a || contains_words(&s, &a)) {
                let c = normalize(canon);
                if known(&c) {
                    return Some(c);
                }
            }
        }

        // 2) Exact, 3) containment ("OpenAI Blog" → openai).
        self.sources
            .iter()
            .map(|k| normalize(k))
            .find(|k| !k.is_empty() && (s == *k || s.contains(k.as_str())))
    }

    pub fn is_top_tier(&self, source: &str) -> bool {
        self.canonical_for(source).is_some()
    }

    /// `boost` for top-tier sources, else 0.
    pub fn boost_for(&self, source: &str) -> f32 {
        if self.is_top_tier(source) {
            self.boost
        } else {
            0.0
        }
    }
}

/// Lowercase; fold dashes, slashes, dots and quotes to spaces; collapse spaces.
pub(crate) fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\', ':'] {
        out = out.replace(ch, " ");
    }

    out = out.replace(['\n', '\r', '\t', '.', ',', '‚', '’', '\'', '(', ')'], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}
