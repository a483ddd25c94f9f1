use chrono::NaiveDate;
use core_types::{Instrument, Market, SignalResult, Stance};
use rust_decimal_macros::dec;
use signal_cache::{CacheError, CacheKey, FingerprintBuilder, SignalCache};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

fn key(symbol: &str) -> CacheKey {
    CacheKey::new(
        "technicals",
        Instrument::new(symbol, Market::Us),
        FingerprintBuilder::new().field("as_of", "2024-01-02").finish(),
    )
}

fn signal(rationale: &str) -> SignalResult {
    SignalResult::new(
        "technicals",
        Stance::Bullish,
        dec!(64),
        rationale,
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_computation() {
    let cache = Arc::new(SignalCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        tasks.push(tokio::spawn(async move {
            cache
                .get_or_compute(&key("AAA"), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, CacheError>(signal("slow"))
                })
                .await
        }));
    }

    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.rationale, "slow");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().computations, 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn in_flight_entries_survive_eviction_pressure() {
    let cache = Arc::new(SignalCache::new(1));
    let release = Arc::new(Notify::new());

    let slow = {
        let cache = Arc::clone(&cache);
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            cache
                .get_or_compute(&key("SLOW"), || async move {
                    release.notified().await;
                    Ok::<_, CacheError>(signal("slow"))
                })
                .await
        })
    };
    // Let the slow computation register its slot.
    tokio::task::yield_now().await;
    while cache.len() == 0 {
        tokio::task::yield_now().await;
    }

    for symbol in ["B", "C", "D"] {
        cache
            .get_or_compute(&key(symbol), || async { Ok::<_, CacheError>(signal(symbol)) })
            .await
            .unwrap();
    }
    // Only completed entries could be evicted; the in-flight slot stays.
    assert!(cache.len() <= 2);

    release.notify_one();
    let result = slow.await.unwrap().unwrap();
    assert_eq!(result.rationale, "slow");
    assert_eq!(cache.len(), 1);
    assert!(cache.peek(&key("SLOW")).unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn cancelled_computation_does_not_wedge_the_key() {
    let cache = Arc::new(SignalCache::new(4));

    let abandoned = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_compute(&key("AAA"), || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, CacheError>(signal("never"))
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        cache.get_or_compute(&key("AAA"), || async { Ok::<_, CacheError>(signal("fresh")) }),
    )
    .await
    .expect("key stayed wedged")
    .unwrap();
    assert_eq!(result.rationale, "fresh");
}

#[tokio::test]
async fn waiters_retry_after_a_failed_computation() {
    let cache = Arc::new(SignalCache::new(4));
    let first = cache
        .get_or_compute(&key("AAA"), || async {
            Err::<SignalResult, _>(CacheError::Corruption("provider down".to_string()))
        })
        .await;
    assert!(first.is_err());
    assert!(cache.peek(&key("AAA")).unwrap().is_none());

    let second = cache
        .get_or_compute(&key("AAA"), || async { Ok::<_, CacheError>(signal("retry")) })
        .await
        .unwrap();
    assert_eq!(second.rationale, "retry");
}
