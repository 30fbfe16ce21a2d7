#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resref_core::{DiscoveryRecord, Error};
use resref_kubehub::{DiscoveryCache, DiscoverySource, StaticDiscovery};

fn pods() -> DiscoveryRecord {
    DiscoveryRecord::new("", "v1", "pods", "Pod").short_names(&["po"]).preferred()
}

/// Counts fetches; the first `slow_calls` fetches sleep for `delay`, `fail_calls` fail outright.
struct Scripted {
    calls: AtomicUsize,
    slow_calls: usize,
    fail_calls: usize,
    delay: Duration,
}

impl Scripted {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), slow_calls: 0, fail_calls: 0, delay: Duration::ZERO }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DiscoverySource for Scripted {
    async fn fetch(&self) -> anyhow::Result<Vec<DiscoveryRecord>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_calls {
            anyhow::bail!("connection refused");
        }
        if n < self.slow_calls {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![pods()])
    }
}

#[tokio::test]
async fn second_call_is_served_from_memory() {
    let src = Arc::new(Scripted::new());
    let cache = DiscoveryCache::new(src.clone());
    assert!(!cache.is_filled());

    let first = cache.records().await.unwrap();
    let second = cache.records().await.unwrap();
    assert_eq!(src.calls(), 1);
    assert!(cache.is_filled());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first[0].resource, "pods");
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let src = Arc::new(Scripted::new());
    let cache = DiscoveryCache::new(src.clone());
    let first = cache.records().await.unwrap();
    cache.invalidate();
    assert!(!cache.is_filled());
    let second = cache.records().await.unwrap();
    assert_eq!(src.calls(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
}

#[tokio::test(start_paused = true)]
async fn timeout_is_unavailable_and_not_cached() {
    let src = Arc::new(Scripted { slow_calls: 1, delay: Duration::from_secs(60), ..Scripted::new() });
    let cache = DiscoveryCache::with_timeout(src.clone(), Duration::from_secs(1));

    let err = cache.records().await.unwrap_err();
    assert!(matches!(err, Error::DiscoveryUnavailable(_)), "got {err:?}");
    assert!(err.to_string().contains("timed out"));
    assert!(!cache.is_filled());

    // second attempt re-fetches cleanly
    let records = cache.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(src.calls(), 2);
}

#[tokio::test]
async fn source_failure_is_unavailable_and_not_cached() {
    let src = Arc::new(Scripted { fail_calls: 1, ..Scripted::new() });
    let cache = DiscoveryCache::new(src.clone());

    let err = cache.records().await.unwrap_err();
    assert!(matches!(err, Error::DiscoveryUnavailable(_)));
    assert!(err.to_string().contains("connection refused"));
    assert!(!cache.is_filled());

    assert!(cache.records().await.is_ok());
    assert_eq!(src.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_callers_share_one_fetch() {
    let src = Arc::new(Scripted { slow_calls: usize::MAX, delay: Duration::from_millis(50), ..Scripted::new() });
    let cache = Arc::new(DiscoveryCache::new(src.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.records().await })
        })
        .collect();
    for t in futures::future::join_all(tasks).await {
        assert_eq!(t.unwrap().unwrap().len(), 1);
    }
    assert_eq!(src.calls(), 1);
}

#[tokio::test]
async fn static_source_through_cache() {
    let cache = DiscoveryCache::new(Arc::new(StaticDiscovery::new(vec![pods()])));
    let records = cache.records().await.unwrap();
    assert_eq!(records[0].gvk().kind, "Pod");
}
