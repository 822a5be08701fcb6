// tests/cache_persistence.rs
// Disk behaviour of the response cache: warm start, corruption tolerance, budget, expiry.

use ai_ml_crawler::cache::{cache_key, Headers, ResponseCache};
use ai_ml_crawler::clock::ManualClock;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ))
}

fn headers(lang: &str) -> Headers {
    let mut h = Headers::new();
    h.insert("Accept-Language".to_string(), lang.to_string());
    h
}

#[test]
fn entries_and_index_survive_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    {
        let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
        cache.set("https://a.test/1", "one", &headers("en"), None);
        cache.set("https://a.test/2", "two", &headers("en"), None);
    }
    assert!(tmp.path().join("cache_index.json").exists());

    let reopened = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c);
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.get("https://a.test/1", &headers("en")).as_deref(), Some("one"));
    assert_eq!(reopened.get("https://a.test/1", &headers("de")), None);
    assert_eq!(reopened.stats().size_bytes, 6);
}

#[test]
fn entries_written_after_last_index_flush_are_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
    for i in 0..3 {
        cache.set(&format!("https://a.test/{i}"), "0123456789", &Headers::new(), None);
    }
    // Crash: no drop, so the index only knows the first write.
    std::mem::forget(cache);

    let reopened = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c);
    let s = reopened.stats();
    assert_eq!(s.entries, 3);
    assert_eq!(s.size_bytes, 30);
    for i in 0..3 {
        assert!(reopened.get(&format!("https://a.test/{i}"), &Headers::new()).is_some());
    }
}

#[test]
fn unindexed_files_count_against_the_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
    for i in 0..4 {
        cache.set(&format!("https://a.test/{i}"), "0123456789", &Headers::new(), None);
        c.advance(ChronoDuration::seconds(1));
    }
    std::mem::forget(cache);

    let reopened = ResponseCache::with_clock(tmp.path(), 25, Duration::from_secs(3600), c);
    assert_eq!(reopened.stats().entries, 2);
    let on_disk = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("cache"))
        .count();
    assert_eq!(on_disk, 2);
}

#[test]
fn corrupt_entry_and_index_are_tolerated() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    let good_key;
    {
        let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
        cache.set("https://a.test/good", "fine", &Headers::new(), None);
        cache.set("https://a.test/bad", "will be clobbered", &Headers::new(), None);
        good_key = cache_key("https://a.test/good", &Headers::new());
    }
    let bad_key = cache_key("https://a.test/bad", &Headers::new());
    let bad_path = tmp.path().join(format!("{bad_key}.cache"));
    fs::write(&bad_path, b"\x00\x01 not json").unwrap();
    fs::write(tmp.path().join("cache_index.json"), "{ truncated").unwrap();

    let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c);
    assert_eq!(cache.len(), 1);
    assert!(tmp.path().join(format!("{good_key}.cache")).exists());
    assert!(!bad_path.exists(), "corrupt entry should be removed on load");
    assert_eq!(cache.get("https://a.test/good", &Headers::new()).as_deref(), Some("fine"));
    assert_eq!(cache.get("https://a.test/bad", &Headers::new()), None);
}

#[test]
fn expired_entries_are_not_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    {
        let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
        cache.set("https://a.test/short", "s", &Headers::new(), Some(Duration::from_secs(60)));
        cache.set("https://a.test/long", "l", &Headers::new(), None);
    }
    c.advance(ChronoDuration::minutes(5));
    let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c);
    assert_eq!(cache.len(), 1);
    assert!(cache.get("https://a.test/short", &Headers::new()).is_none());
    assert!(cache.get("https://a.test/long", &Headers::new()).is_some());
}

#[test]
fn smaller_budget_on_reopen_evicts_oldest() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    {
        let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
        for i in 0..4 {
            cache.set(&format!("https://a.test/{i}"), "0123456789", &Headers::new(), None);
            c.advance(ChronoDuration::seconds(1));
        }
    }
    let cache = ResponseCache::with_clock(tmp.path(), 25, Duration::from_secs(3600), c);
    let s = cache.stats();
    assert!(s.size_bytes <= 25);
    assert_eq!(s.entries, 2);
    assert!(cache.get("https://a.test/0", &Headers::new()).is_none());
    assert!(cache.get("https://a.test/3", &Headers::new()).is_some());
}

#[test]
fn budget_holds_under_many_inserts() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    let cache = ResponseCache::with_clock(tmp.path(), 100, Duration::from_secs(3600), c.clone());
    for i in 0..50 {
        cache.set(&format!("https://b.test/{i}"), &"x".repeat(7 + i % 5), &Headers::new(), None);
        c.advance(ChronoDuration::seconds(1));
        assert!(cache.stats().size_bytes <= 100);
    }
    assert!(cache.stats().evictions > 0);
    assert!(cache.get("https://b.test/49", &Headers::new()).is_some());
}

#[test]
fn optimize_sweeps_and_reports() {
    let tmp = tempfile::tempdir().unwrap();
    let c = clock();
    let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), c.clone());
    cache.set("https://a.test/x", "x", &Headers::new(), Some(Duration::from_secs(1)));
    cache.set("https://a.test/y", "y", &Headers::new(), None);
    c.advance(ChronoDuration::seconds(2));

    let s = cache.optimize();
    assert_eq!(s.entries, 1);
    assert_eq!(s.expired, 1);
    let index = fs::read_to_string(tmp.path().join("cache_index.json")).unwrap();
    assert!(index.contains("https://a.test/y"));
    assert!(!index.contains("https://a.test/x"));
}

#[test]
fn clear_all_empties_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = ResponseCache::with_clock(tmp.path(), 1 << 20, Duration::from_secs(3600), clock());
    cache.set("https://a.test/x", "x", &Headers::new(), None);
    cache.clear_all();
    assert!(cache.is_empty());
    let left = fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("cache"))
        .count();
    assert_eq!(left, 0);
}

#[test]
fn shared_cache_across_threads_keeps_accounting() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = Arc::new(ResponseCache::new(tmp.path(), 1_000, Duration::from_secs(3600)));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..25 {
                    cache.set(&format!("https://t{t}.test/{i}"), "0123456789", &Headers::new(), None);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let s = cache.stats();
    assert_eq!(s.size_bytes, s.entries as u64 * 10);
    assert!(s.size_bytes <= 1_000);
}
