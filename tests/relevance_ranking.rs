// tests/relevance_ranking.rs
// Ranking properties over the built-in keyword table.

use ai_ml_crawler::dates::NormalizedDate;
use ai_ml_crawler::relevance::{KeywordTable, RelevanceScorer};
use ai_ml_crawler::authority::SourceAuthority;
use ai_ml_crawler::ContentItem;
use chrono::{DateTime, Duration, TimeZone, Utc};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn scorer() -> RelevanceScorer {
    RelevanceScorer::default()
}

#[test]
fn multimodal_lab_post_beats_old_random_post() {
    let fresh = ContentItem::new(
        "GPT-4V: Multimodal Large Language Model",
        "https://openai.com/research/gpt-4v",
        "OpenAI Blog",
    )
    .with_date(NormalizedDate::from(now()))
    .with_tags(["multimodal", "ai", "research"]);

    let stale = ContentItem::new("Random Old Blog Post", "https://blog.example/old", "Unknown")
        .with_date(NormalizedDate::from(now() - Duration::days(730)))
        .with_tags(["blog"]);

    let s = scorer();
    assert!(s.score_at(&fresh, now()) > s.score_at(&stale, now()));
    assert!(s.score_at(&stale, now()) <= 0.0);

    let ranked = s.rank_at(vec![stale, fresh], now());
    assert_eq!(ranked.len(), 1, "stale item must be excluded");
    assert_eq!(ranked[0].title, "GPT-4V: Multimodal Large Language Model");
    assert!(ranked[0].relevance_score > 0.0);
    assert_eq!(
        ranked[0].relevance_reasons,
        vec![
            "Multimodal AI: multimodal, gpt-4v, gpt-4".to_string(),
            "Recent content".to_string(),
        ]
    );
}

#[test]
fn item_without_any_signal_is_dropped() {
    let plain = ContentItem::new("Quarterly gardening notes", "https://garden.example/q3", "Garden Weekly")
        .with_summary("Tomatoes, peppers and beans.");
    let ranked = scorer().rank_at(vec![plain], now());
    assert!(ranked.is_empty());
}

#[test]
fn unknown_date_gets_no_bonus_but_is_not_excluded() {
    let item = ContentItem::new("A chatbot for support desks", "https://x.example/bot", "Dev Blog");
    let s = scorer();
    let b = s.explain_at(&item, now());
    assert_eq!(b.recency, 0.0);
    let ranked = s.rank_at(vec![item], now());
    assert_eq!(ranked.len(), 1);
}

#[test]
fn equal_scores_keep_input_order() {
    let mk = |title: &str, url: &str| {
        ContentItem::new(title, url, "Dev Blog").with_summary("notes on langchain")
    };
    let items = vec![
        mk("first", "https://x/1"),
        mk("second", "https://x/2"),
        ContentItem::new("top", "https://x/0", "Dev Blog").with_summary("langchain and autogen for smart grid"),
        mk("third", "https://x/3"),
    ];
    let ranked = scorer().rank_at(items, now());
    let titles: Vec<&str> = ranked.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["top", "first", "second", "third"]);
}

#[test]
fn adding_a_keyword_never_lowers_the_score() {
    let s = scorer();
    let base = ContentItem::new("Notes on vision transformer training", "u", "Dev Blog");
    let more = ContentItem::new("Notes on vision transformer training for image captioning", "u", "Dev Blog");
    let a = s.score_at(&base, now());
    let b = s.score_at(&more, now());
    assert!(b > a, "{b} should exceed {a}");
}

#[test]
fn repository_engagement_and_reason() {
    let repo = ContentItem::new("crewai: multi-agent orchestration", "https://github.com/x/crewai", "GitHub")
        .with_engagement(Some(3_400), Some(250));
    let s = scorer();
    let b = s.explain_at(&repo, now());
    assert!((b.engagement - 3.0).abs() < 1e-6);
    let ranked = s.rank_at(vec![repo], now());
    assert!(ranked[0]
        .relevance_reasons
        .contains(&"High engagement (3400 stars)".to_string()));
}

#[test]
fn authority_boost_applies_independently_of_company_keywords() {
    let s = scorer();
    let from_lab = ContentItem::new("Tool use in practice", "u", "Anthropic News");
    let about_lab = ContentItem::new("Tool use in practice at anthropic", "u", "Dev Blog");
    let b1 = s.explain_at(&from_lab, now());
    let b2 = s.explain_at(&about_lab, now());
    assert_eq!(b1.authority, 2.0);
    assert_eq!(b2.authority, 0.0);
    assert!(b2.keywords > b1.keywords);
}

#[test]
fn horizon_controls_the_oldest_tier() {
    let item = ContentItem::new("A chatbot", "u", "Dev Blog")
        .with_date(NormalizedDate::from(now() - Duration::days(300)));
    let wide = RelevanceScorer::new(KeywordTable::default_seed(), SourceAuthority::default_seed());
    let narrow = wide.clone().with_horizon_days(200);
    assert_eq!(wide.explain_at(&item, now()).recency, 0.5);
    assert_eq!(narrow.explain_at(&item, now()).recency, 0.0);
}

#[test]
fn research_and_paper_tags_are_case_insensitive() {
    let s = scorer();
    let tagged = ContentItem::new("x", "u", "Dev Blog").with_tags(["PAPER"]);
    assert_eq!(s.explain_at(&tagged, now()).research, 1.0);
    let other = ContentItem::new("x", "u", "Dev Blog").with_tags(["papers"]);
    assert_eq!(s.explain_at(&other, now()).research, 0.0);
}
