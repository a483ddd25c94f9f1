use chrono::NaiveDate;
use core_types::{Instrument, Market, SignalResult, Stance};
use rust_decimal_macros::dec;
use signal_cache::{CacheError, CacheKey, FingerprintBuilder, SignalCache};

fn key(n: u32) -> CacheKey {
    CacheKey::new(
        "fundamentals",
        Instrument::new("0700", Market::HongKong),
        FingerprintBuilder::new().field("n", n).finish(),
    )
}

fn signal(n: u32) -> SignalResult {
    SignalResult::new(
        "fundamentals",
        Stance::Bearish,
        dec!(75),
        format!("period {}", n),
        NaiveDate::from_ymd_opt(2024, 3, 28).unwrap(),
    )
}

#[tokio::test]
async fn spilled_entries_reload_as_hits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");

    let cache = SignalCache::new(8);
    for n in 0..3 {
        cache
            .get_or_compute(&key(n), || async move { Ok::<_, CacheError>(signal(n)) })
            .await
            .unwrap();
    }
    assert_eq!(cache.spill(&path).unwrap(), 3);

    let reloaded = SignalCache::load(&path, 8).unwrap();
    assert_eq!(reloaded.len(), 3);
    let value = reloaded
        .get_or_compute(&key(1), || async { Err::<SignalResult, _>(CacheError::Corruption("recomputed".into())) })
        .await
        .unwrap();
    assert_eq!(value, signal(1));
    assert_eq!(reloaded.stats().hits, 1);
    assert_eq!(reloaded.stats().computations, 0);
}

#[test]
fn load_keeps_most_recent_entries_when_over_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();

    let cache = SignalCache::new(8);
    runtime.block_on(async {
        for n in 0..4 {
            cache
                .get_or_compute(&key(n), || async move { Ok::<_, CacheError>(signal(n)) })
                .await
                .unwrap();
        }
    });
    cache.spill(&path).unwrap();

    let reloaded = SignalCache::load(&path, 2).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded.peek(&key(0)).unwrap().is_none());
    assert!(reloaded.peek(&key(3)).unwrap().is_some());
}

#[test]
fn missing_spill_file_is_an_empty_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = SignalCache::load(&dir.path().join("absent.json"), 8).unwrap();
    assert!(cache.is_empty());
}

#[test]
fn corrupt_spill_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    std::fs::write(&path, b"{ not json").unwrap();
    let err = SignalCache::load(&path, 8).unwrap_err();
    assert!(matches!(err, CacheError::Corruption(_)));
}
