// src/dates/extractor.rs
//! Publication date extraction from parsed HTML.
//!
//! Five strategies run in fixed order; a candidate that does not normalise
//! (or lands on today) moves the search on to the next candidate / strategy.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use super::{try_normalize_at, NormalizedDate};

/// Which strategy produced a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateStrategy {
    TimeElement,
    MetaTags,
    JsonLd,
    Url,
    TextPattern,
}

impl DateStrategy {
    pub const ORDER: [DateStrategy; 5] = [
        DateStrategy::TimeElement,
        DateStrategy::MetaTags,
        DateStrategy::JsonLd,
        DateStrategy::Url,
        DateStrategy::TextPattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateStrategy::TimeElement => "time_element",
            DateStrategy::MetaTags => "meta_tags",
            DateStrategy::JsonLd => "json_ld",
            DateStrategy::Url => "url",
            DateStrategy::TextPattern => "text_pattern",
        }
    }
}

impl fmt::Display for DateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* ----------------------------
Selectors & patterns
---------------------------- */

static SEL_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("time selector"));
static SEL_META: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[content]").expect("meta selector"));
static SEL_JSON_LD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("json-ld selector")
});
static SEL_TEXT_CONTAINERS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span[class], div[class], p[class], time[class]").expect("text selector"));

const PUBLICATION_HINTS: &[&str] = &["publish", "post", "date", "created", "article"];

/// Meta keys in priority order, matched against `property`, `name` or `itemprop`.
const META_KEYS: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "datePublished",
    "publishdate",
    "pubdate",
    "article:modified_time",
    "og:updated_time",
    "date",
    "DC.date",
];

const JSON_LD_TYPES: &[&str] = &["Article", "BlogPosting", "NewsArticle"];
const JSON_LD_FIELDS: &[&str] = &["datePublished", "dateCreated", "dateModified"];

// Years limited to 19xx/20xx so numeric ids in paths are not read as dates.
static URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/((?:19|20)\d{2})/(\d{1,2})/(\d{1,2})/",
        r"/((?:19|20)\d{2})-(\d{1,2})-(\d{1,2})",
        r"/((?:19|20)\d{2})/(\d{1,2})/",
        r"/((?:19|20)\d{2})/",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("url date regex"))
    .collect()
});

static RE_DATE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)date|time|publish|post-date").expect("class regex"));

const LONG_MONTHS: &str =
    "January|February|March|April|May|June|July|August|September|October|November|December";
const SHORT_MONTHS: &str = "Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec";

static TEXT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d{4}-\d{1,2}-\d{1,2}".to_string(),
        r"\d{1,2}/\d{1,2}/\d{4}".to_string(),
        r"\d{1,2}\.\d{1,2}\.\d{4}".to_string(),
        format!(r"(?i)\b(?:{LONG_MONTHS})\s+\d{{1,2}},?\s+\d{{4}}"),
        format!(r"(?i)\b(?:{SHORT_MONTHS})\.?\s+\d{{1,2}},?\s+\d{{4}}"),
        format!(r"(?i)\b\d{{1,2}}\s+(?:{LONG_MONTHS})\s+\d{{4}}"),
        format!(r"(?i)\b\d{{1,2}}\s+(?:{SHORT_MONTHS})\s+\d{{4}}"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("text date regex"))
    .collect()
});

fn lower_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().to_lowercase()
}

fn has_hint(s: &str) -> bool {
    let s = s.to_lowercase();
    PUBLICATION_HINTS.iter().any(|h| s.contains(h))
}

fn looks_like_publication_time(el: ElementRef<'_>) -> bool {
    if el.value().classes().any(has_hint) {
        return true;
    }
    el.parent()
        .and_then(ElementRef::wrap)
        .map(|p| {
            let t = lower_text(p);
            PUBLICATION_HINTS.iter().any(|h| t.contains(h))
        })
        .unwrap_or(false)
}

fn json_ld_type_matches(obj: &serde_json::Map<String, Value>) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => JSON_LD_TYPES.contains(&t.as_str()),
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| JSON_LD_TYPES.contains(&t)),
        _ => false,
    }
}

/// Collect raw date strings from article-like JSON-LD nodes, in document order.
fn collect_json_ld_dates(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Array(items) => items.iter().for_each(|i| collect_json_ld_dates(i, out)),
        Value::Object(obj) => {
            if json_ld_type_matches(obj) {
                for field in JSON_LD_FIELDS {
                    if let Some(s) = obj.get(*field).and_then(Value::as_str) {
                        out.push(s.to_string());
                    }
                }
            }
            if let Some(graph) = obj.get("@graph") {
                collect_json_ld_dates(graph, out);
            }
        }
        _ => {}
    }
}

/* ----------------------------
DateExtractor
---------------------------- */

/// Stateless extractor; cheap to clone into every scraper.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the publication date from a fragment (e.g. one article card).
    pub fn extract(&self, fragment: ElementRef<'_>, url: &str) -> NormalizedDate {
        self.extract_at(fragment, url, Utc::now())
    }

    pub fn extract_at(&self, fragment: ElementRef<'_>, url: &str, now: DateTime<Utc>) -> NormalizedDate {
        self.extract_with_strategy(fragment, url, now).0
    }

    pub fn extract_document(&self, doc: &Html, url: &str) -> NormalizedDate {
        self.extract_at(doc.root_element(), url, Utc::now())
    }

    /// Parse `html` as a full document and extract from it.
    pub fn extract_from_html(&self, html: &str, url: &str) -> NormalizedDate {
        self.extract_from_html_at(html, url, Utc::now())
    }

    pub fn extract_from_html_at(&self, html: &str, url: &str, now: DateTime<Utc>) -> NormalizedDate {
        let doc = Html::parse_document(html);
        self.extract_at(doc.root_element(), url, now)
    }

    /// Run the chain and report which strategy won (`None` when the result is `Unknown`).
    pub fn extract_with_strategy(
        &self,
        fragment: ElementRef<'_>,
        url: &str,
        now: DateTime<Utc>,
    ) -> (NormalizedDate, Option<DateStrategy>) {
        for strategy in DateStrategy::ORDER {
            let found = match strategy {
                DateStrategy::TimeElement => self.from_time_element(fragment, now),
                DateStrategy::MetaTags => self.from_meta_tags(fragment, now),
                DateStrategy::JsonLd => self.from_json_ld(fragment, now),
                DateStrategy::Url => self.from_url(url, now),
                DateStrategy::TextPattern => self.from_text(fragment, now),
            };
            if let Some(dt) = found {
                debug!(target: "dates", strategy = %strategy, url, date = %dt, "publication date extracted");
                return (NormalizedDate::Known(dt), Some(strategy));
            }
        }
        debug!(target: "dates", url, "no publication date found");
        (NormalizedDate::Unknown, None)
    }

    /// `time[datetime]`: publication-looking elements first, then any element in order.
    pub fn from_time_element(&self, root: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let times: Vec<ElementRef<'_>> = root.select(&SEL_TIME).collect();
        let preferred = times.iter().filter(|el| looks_like_publication_time(**el));
        preferred
            .chain(times.iter())
            .filter_map(|el| el.value().attr("datetime"))
            .find_map(|raw| try_normalize_at(raw, now))
    }

    pub fn from_meta_tags(&self, root: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let metas: Vec<ElementRef<'_>> = root.select(&SEL_META).collect();
        for key in META_KEYS {
            for meta in &metas {
                let v = meta.value();
                let matches_key = ["property", "name", "itemprop"]
                    .iter()
                    .filter_map(|a| v.attr(a))
                    .any(|a| a.trim().eq_ignore_ascii_case(key));
                if !matches_key {
                    continue;
                }
                if let Some(dt) = v.attr("content").and_then(|c| try_normalize_at(c, now)) {
                    return Some(dt);
                }
            }
        }
        None
    }

    pub fn from_json_ld(&self, root: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        for script in root.select(&SEL_JSON_LD) {
            let body = script.text().collect::<String>();
            let value: Value = match serde_json::from_str(body.trim()) {
                Ok(v) => v,
                Err(e) => {
                    debug!(target: "dates", error = %e, "skipping malformed JSON-LD block");
                    continue;
                }
            };
            let mut raws = Vec::new();
            collect_json_ld_dates(&value, &mut raws);
            if let Some(dt) = raws.iter().find_map(|r| try_normalize_at(r, now)) {
                return Some(dt);
            }
        }
        None
    }

    /// Date-shaped path segments, most specific pattern first.
    pub fn from_url(&self, url: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if url.trim().is_empty() {
            return None;
        }
        let path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        let path = format!("{}/", path.trim_end_matches('/'));

        for re in URL_PATTERNS.iter() {
            let Some(c) = re.captures(&path) else {
                continue;
            };
            let year = &c[1];
            let month = c.get(2).map(|m| m.as_str()).unwrap_or("1");
            let day = c.get(3).map(|m| m.as_str()).unwrap_or("1");
            let raw = format!("{year}-{month:0>2}-{day:0>2}");
            if let Some(dt) = try_normalize_at(&raw, now) {
                return Some(dt);
            }
        }
        None
    }

    /// Date-looking text inside elements whose class mentions a date.
    pub fn from_text(&self, root: ElementRef<'_>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        for el in root.select(&SEL_TEXT_CONTAINERS) {
            let class = el.value().attr("class").unwrap_or_default();
            if !RE_DATE_CLASS.is_match(class) {
                continue;
            }
            let text = el.text().collect::<String>();
            for re in TEXT_PATTERNS.iter() {
                if let Some(dt) = re
                    .find_iter(&text)
                    .find_map(|m| try_normalize_at(m.as_str(), now))
                {
                    return Some(dt);
                }
            }
        }
        None
    }
}
