// src/dates/mod.rs
//! Date normalization: raw date tokens of unknown format → one canonical UTC form.
//!
//! - Canonical text form is `YYYY-MM-DDTHH:MM:SSZ`; anything unparseable is `Unknown`.
//! - Parse attempts run in a fixed order and the first success wins.
//! - A parse that lands on today's UTC calendar day is rejected (it is usually a
//!   "last crawled" stamp, not a publication date).
//! - `Unknown` always passes recency checks.

pub mod extractor;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tracing::debug;

pub use extractor::{DateExtractor, DateStrategy};

/// strftime pattern of the canonical form.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
/// Text form of an unknown date.
pub const UNKNOWN: &str = "Unknown";

/// A publication date in canonical UTC precision, or the explicit `Unknown` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NormalizedDate {
    Known(DateTime<Utc>),
    #[default]
    Unknown,
}

impl NormalizedDate {
    pub fn is_known(&self) -> bool {
        matches!(self, NormalizedDate::Known(_))
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            NormalizedDate::Known(dt) => Some(*dt),
            NormalizedDate::Unknown => None,
        }
    }

    /// Whole calendar days between this date and `now` (time of day ignored).
    /// Negative for future dates; `None` when unknown.
    pub fn age_days_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.as_datetime()
            .map(|dt| (now.date_naive() - dt.date_naive()).num_days())
    }
}

impl From<DateTime<Utc>> for NormalizedDate {
    fn from(dt: DateTime<Utc>) -> Self {
        NormalizedDate::Known(truncate_to_seconds(dt))
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedDate::Known(dt) => write!(f, "{}", format_canonical(dt)),
            NormalizedDate::Unknown => f.write_str(UNKNOWN),
        }
    }
}

/// Lenient: accepts the canonical form and anything [`parse_lenient`] understands.
/// No same-day rejection here, so stored values read back unchanged.
impl FromStr for NormalizedDate {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.is_empty() || t.eq_ignore_ascii_case(UNKNOWN) {
            return Ok(NormalizedDate::Unknown);
        }
        Ok(parse_lenient(t)
            .map(NormalizedDate::Known)
            .unwrap_or(NormalizedDate::Unknown))
    }
}

impl Serialize for NormalizedDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NormalizedDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default())
    }
}

/// Format a timestamp in the canonical `YYYY-MM-DDTHH:MM:SSZ` form.
pub fn format_canonical(dt: &DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/* ----------------------------
Parsing tables
---------------------------- */

// Offset-bearing variants that RFC 3339 rejects (no colon in offset, space separator, ...).
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M%z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    // HTTP-date once the trailing "GMT" is stripped.
    "%a, %d %b %Y %H:%M:%S",
];

// Month-first before day-first for slash dates (US convention wins ties).
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d %B, %Y",
    "%A, %B %d, %Y",
    "%a, %d %b %Y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
];

static RE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:published|posted|updated|date)(?:\s+on)?\s*:?\s*").expect("label regex")
});
static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("ordinal regex"));
static RE_SEPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bsept\b").expect("sept regex"));
static RE_ABBR_DOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\.").expect("abbr regex")
});
static RE_TZ_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(?:utc|gmt)$").expect("tz name regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

static RE_EMBEDDED_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})\b").expect("iso regex"));
static RE_EMBEDDED_US: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("us regex"));

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

fn midnight_utc(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))
}

/// Strip labels, ordinal suffixes, abbreviation dots and trailing zone names.
fn clean_token(s: &str) -> String {
    let out = RE_LABEL.replace(s, "");
    let out = RE_ORDINAL.replace_all(&out, "$1");
    let out = RE_SEPT.replace_all(&out, "Sep");
    let out = RE_ABBR_DOT.replace_all(&out, "$1");
    let out = RE_TZ_NAME.replace(&out, "");
    RE_WS.replace_all(out.trim(), " ").to_string()
}

fn embedded_date(s: &str) -> Option<NaiveDate> {
    if let Some(c) = RE_EMBEDDED_ISO.captures(s) {
        let (y, m, d) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    let c = RE_EMBEDDED_US.captures(s)?;
    NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)
}

/// Parse a raw token into UTC, first successful format wins.
///
/// Offset-aware input is converted to UTC; naive input is taken as UTC.
/// Sub-second precision is dropped.
pub fn parse_lenient(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(truncate_to_seconds(dt.with_timezone(&Utc)));
    }

    if let Ok(odt) = OffsetDateTime::parse(s, &Rfc2822) {
        if let Some(dt) = Utc.timestamp_opt(odt.unix_timestamp(), 0).single() {
            return Some(dt);
        }
    }

    let cleaned = clean_token(s);
    if cleaned.is_empty() {
        return None;
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&cleaned, fmt) {
            return Some(truncate_to_seconds(dt.with_timezone(&Utc)));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Some(truncate_to_seconds(Utc.from_utc_datetime(&ndt)));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(midnight_utc(d));
        }
    }

    embedded_date(&cleaned).map(midnight_utc)
}

/* ----------------------------
Public normalizer API
---------------------------- */

/// Parse `raw` relative to `now`, rejecting same-day results.
///
/// Returns `None` on failure so callers with a strategy chain can fall through.
pub fn try_normalize_at(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let dt = parse_lenient(raw)?;
    if dt.date_naive() == now.date_naive() {
        debug!(target: "dates", raw = %raw.trim(), "rejecting same-day date as crawl timestamp");
        return None;
    }
    Some(dt)
}

/// Normalize a raw token against an explicit `now`.
pub fn normalize_at(raw: &str, now: DateTime<Utc>) -> NormalizedDate {
    try_normalize_at(raw, now)
        .map(NormalizedDate::Known)
        .unwrap_or(NormalizedDate::Unknown)
}

/// Normalize a raw token against the current time.
pub fn normalize(raw: &str) -> NormalizedDate {
    normalize_at(raw, Utc::now())
}

/// `Unknown` is always recent; otherwise compare calendar days with `now`.
pub fn is_recent_at(date: &NormalizedDate, max_days_back: u32, now: DateTime<Utc>) -> bool {
    match date.age_days_at(now) {
        None => true,
        Some(age) => age <= i64::from(max_days_back),
    }
}

/// [`is_recent_at`] against the current time.
pub fn is_recent(date: &NormalizedDate, max_days_back: u32) -> bool {
    is_recent_at(date, max_days_back, Utc::now())
}
