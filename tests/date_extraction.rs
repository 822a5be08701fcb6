// tests/date_extraction.rs
// Extraction over realistic HTML fixtures; time is pinned so same-day rejection is deterministic.

use ai_ml_crawler::dates::{DateExtractor, DateStrategy, NormalizedDate};
use chrono::{DateTime, TimeZone, Utc};
use scraper::{Html, Selector};

const BLOG: &str = include_str!("fixtures/blog_time_and_url.html");
const META: &str = include_str!("fixtures/meta_only.html");
const JSON_LD: &str = include_str!("fixtures/json_ld_graph.html");
const LISTING: &str = include_str!("fixtures/listing.html");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn extract(html: &str, url: &str) -> (NormalizedDate, Option<DateStrategy>) {
    let doc = Html::parse_document(html);
    DateExtractor::new().extract_with_strategy(doc.root_element(), url, now())
}

#[test]
fn time_attribute_beats_conflicting_url_date() {
    let (d, s) = extract(BLOG, "https://example.com/blog/2023/01/05/vision-agent/");
    assert_eq!(d.to_string(), "2024-03-15T13:30:00Z");
    assert_eq!(s, Some(DateStrategy::TimeElement));
}

#[test]
fn url_used_when_markup_has_nothing() {
    let (d, s) = extract(
        "<html><body><p>Nothing here</p></body></html>",
        "https://example.com/blog/2023/01/05/vision-agent/",
    );
    assert_eq!(d.to_string(), "2023-01-05T00:00:00Z");
    assert_eq!(s, Some(DateStrategy::Url));
}

#[test]
fn meta_published_time_has_priority() {
    let (d, s) = extract(META, "https://example.com/grid");
    assert_eq!(d.to_string(), "2024-02-01T11:00:00Z");
    assert_eq!(s, Some(DateStrategy::MetaTags));
}

#[test]
fn json_ld_falls_back_to_date_modified() {
    let (d, s) = extract(JSON_LD, "https://example.com/agents");
    assert_eq!(d.to_string(), "2024-05-10T08:00:00Z");
    assert_eq!(s, Some(DateStrategy::JsonLd));
}

#[test]
fn per_card_extraction_on_listing_page() {
    let doc = Html::parse_document(LISTING);
    let cards = Selector::parse("div.card").unwrap();
    let link = Selector::parse("a[href]").unwrap();
    let ex = DateExtractor::new();

    let dates: Vec<String> = doc
        .select(&cards)
        .map(|card| {
            let href = card
                .select(&link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default();
            let url = format!("https://example.com{href}");
            ex.extract_at(card, &url, now()).to_string()
        })
        .collect();

    assert_eq!(
        dates,
        vec![
            "2024-01-10T00:00:00Z".to_string(),
            "2023-11-02T00:00:00Z".to_string(),
            "Unknown".to_string(),
        ]
    );
}

#[test]
fn extract_from_html_string_matches_document_path() {
    let ex = DateExtractor::new();
    let a = ex.extract_from_html_at(META, "https://example.com/grid", now());
    let (b, _) = extract(META, "https://example.com/grid");
    assert_eq!(a, b);
}

#[test]
fn todays_dates_fall_through_to_unknown() {
    let html = r#"<html><head>
        <meta property="article:published_time" content="2025-06-01T06:00:00Z">
        </head><body>
        <time datetime="2025-06-01">Today</time>
        <span class="date">June 1, 2025</span>
        </body></html>"#;
    let (d, s) = extract(html, "https://example.com/post");
    assert_eq!(d, NormalizedDate::Unknown);
    assert_eq!(s, None);
}
