//! Integration tests for the on-disk response cache
//!
//! Covers reloading, corrupt documents, simulated expiry and the unlocked
//! last-writer-wins behaviour of two caches sharing one document.

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

use engtutor::cache::{to_unix_secs, Clock, ExpiringCache, ManualClock, TTL_SECS};
use engtutor::lesson::{cache_key, Difficulty, OutputFormat};

fn start_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
}

#[test]
fn test_reload_reproduces_entries() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");
    let clock = start_clock();

    let mut cache = ExpiringCache::with_clock(&path, clock.clone());
    cache.put("text_Gears_Beginner", &"Gears mesh...").unwrap();
    cache
        .put("image_Gears_Beginner", &json!({"url": "http://x/g.png", "w": 512}))
        .unwrap();

    let reloaded = ExpiringCache::with_clock(&path, clock);

    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.get("text_Gears_Beginner"), Some(&json!("Gears mesh...")));
    assert_eq!(
        reloaded.get("image_Gears_Beginner"),
        Some(&json!({"url": "http://x/g.png", "w": 512}))
    );
    assert_eq!(
        reloaded.stored_at("text_Gears_Beginner"),
        cache.stored_at("text_Gears_Beginner")
    );
}

#[test]
fn test_corrupt_document_loads_empty_every_time() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");
    fs::write(&path, "{ this is not json").unwrap();

    let first = ExpiringCache::open(&path);
    let second = ExpiringCache::open(&path);

    assert!(first.is_empty());
    assert!(second.is_empty());
}

#[test]
fn test_wrong_shape_document_loads_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");
    fs::write(&path, r#"{"k": {"data": "missing timestamp"}}"#).unwrap();

    assert!(ExpiringCache::open(&path).is_empty());
}

#[test]
fn test_put_after_corrupt_load_rewrites_valid_document() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");
    fs::write(&path, "garbage").unwrap();

    let mut cache = ExpiringCache::open(&path);
    cache.put("k", &"v").unwrap();

    let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["k"]["data"], json!("v"));
}

#[test]
fn test_reads_document_written_by_other_tools() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");
    let clock = start_clock();
    let now = to_unix_secs(clock.now());
    fs::write(
        &path,
        format!(r#"{{"text_Bernoulli_Beginner": {{"timestamp": {now}, "data": "Bernoulli states..."}}}}"#),
    )
    .unwrap();

    let cache = ExpiringCache::with_clock(&path, clock);

    assert_eq!(
        cache.get("text_Bernoulli_Beginner"),
        Some(&json!("Bernoulli states..."))
    );
}

#[test]
fn test_bernoulli_scenario_expires_after_a_day() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let clock = start_clock();
    let mut cache = ExpiringCache::with_clock(temp_dir.path().join("cache.json"), clock.clone());
    let key = cache_key(OutputFormat::Text, "Bernoulli", Difficulty::Beginner);
    assert_eq!(key, "text_Bernoulli_Beginner");

    assert!(cache.get(&key).is_none());
    cache.put(&key, &"Bernoulli states...").unwrap();

    clock.advance(Duration::hours(23));
    assert_eq!(cache.get(&key), Some(&json!("Bernoulli states...")));

    clock.advance(Duration::seconds(3600 + 1));
    assert!(cache.get(&key).is_none(), "Entry older than 24h must read as absent");
}

#[test]
fn test_expiry_survives_reload() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");
    let clock = start_clock();

    let mut cache = ExpiringCache::with_clock(&path, clock.clone());
    cache.put("k", &1).unwrap();

    clock.advance(Duration::seconds(TTL_SECS as i64 + 1));
    let reloaded = ExpiringCache::with_clock(&path, clock);

    assert!(reloaded.get("k").is_none());
    assert_eq!(reloaded.len(), 1);
}

#[test]
fn test_two_handles_last_writer_wins() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("cache.json");

    let mut first = ExpiringCache::open(&path);
    let mut second = ExpiringCache::open(&path);

    first.put("from_first", &1).unwrap();
    second.put("from_second", &2).unwrap();

    let reloaded = ExpiringCache::open(&path);
    assert!(reloaded.get("from_first").is_none(), "First writer is clobbered");
    assert_eq!(reloaded.get("from_second"), Some(&json!(2)));
}
