//! Deduplicating, time-bounded cache in front of every page fetch

use super::extract::extract;
use super::types::{CacheEntry, FetchResult, FetchStatus, Metadata};
use crate::config::{FetchGuardMode, PreviewConfig};
use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::logging::log_fetch_error;
use crate::media::{MediaStore, relocate};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Cache statistics for monitoring
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses answered by a fetch another task completed while this one waited
    pub coalesced: u64,
    pub fetches: u64,
    pub fetch_errors: u64,
    pub uploads: u64,
    pub upload_errors: u64,
}

/// Serializes the miss path, either cache-wide or per URL
enum FetchGuard {
    Global(Arc<Mutex<()>>),
    PerUrl(DashMap<String, Arc<Mutex<()>>>),
}

impl FetchGuard {
    fn new(mode: FetchGuardMode) -> Self {
        match mode {
            FetchGuardMode::Global => Self::Global(Arc::new(Mutex::new(()))),
            FetchGuardMode::PerUrl => Self::PerUrl(DashMap::new()),
        }
    }

    /// Waits without a deadline; only the fetch itself is time-bounded.
    async fn acquire(&self, url: &str) -> OwnedMutexGuard<()> {
        match self {
            Self::Global(lock) => lock.clone().lock_owned().await,
            Self::PerUrl(locks) => {
                let lock = locks.entry(url.to_string()).or_default().clone();
                lock.lock_owned().await
            }
        }
    }

    /// Drop the per-URL lock once nobody holds or awaits it
    fn release(&self, url: &str) {
        if let Self::PerUrl(locks) = self {
            locks.remove_if(url, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

struct CacheInner {
    fetcher: Arc<dyn Fetcher>,
    media: Arc<dyn MediaStore>,
    entries: DashMap<String, CacheEntry>,
    guard: FetchGuard,
    ttl: Duration,
    stats: RwLock<CacheStats>,
}

/// Link metadata cache keyed by the exact URL text.
///
/// Cheap to clone; clones share the same entries and fetch guard. Construct
/// one per running service and hand it to every consumer.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<CacheInner>,
}

impl FetchCache {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        media: Arc<dyn MediaStore>,
        config: &PreviewConfig,
    ) -> Self {
        Self::with_options(fetcher, media, config.cache_ttl, config.fetch_guard)
    }

    pub fn with_options(
        fetcher: Arc<dyn Fetcher>,
        media: Arc<dyn MediaStore>,
        ttl: Duration,
        guard: FetchGuardMode,
    ) -> Self {
        tracing::info!(
            ttl_secs = ttl.as_secs(),
            guard = ?guard,
            "Creating link metadata cache"
        );

        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                media,
                entries: DashMap::new(),
                guard: FetchGuard::new(guard),
                ttl,
                stats: RwLock::new(CacheStats::default()),
            }),
        }
    }

    /// Cached metadata for `url`, fetching it on a miss.
    pub async fn get_or_fetch(&self, url: &str) -> Result<Arc<Metadata>, FetchError> {
        self.lookup(url).await.map(|(metadata, _)| metadata)
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch) but reports where the
    /// answer came from.
    pub async fn resolve(&self, url: &str) -> FetchResult {
        match self.lookup(url).await {
            Ok((metadata, FetchStatus::Fresh)) => FetchResult::fresh(metadata),
            Ok((metadata, _)) => FetchResult::cached(metadata),
            Err(e) => FetchResult::failed(e),
        }
    }

    async fn lookup(&self, url: &str) -> Result<(Arc<Metadata>, FetchStatus), FetchError> {
        if let Some(metadata) = self.inner.cached(url) {
            self.inner.stats.write().await.hits += 1;
            tracing::trace!(url = %url, "Link cache hit");
            return Ok((metadata, FetchStatus::Cached));
        }

        self.inner.stats.write().await.misses += 1;
        tracing::debug!(url = %url, "Link cache miss");

        // Detached: if the caller goes away the fetch still completes and
        // populates the cache.
        let inner = self.inner.clone();
        let key = url.to_string();
        tokio::spawn(async move { inner.fetch_and_store(&key).await })
            .await
            .map_err(|e| FetchError::Network(format!("fetch task failed: {e}")))?
    }

    /// Remove expired entries, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.inner.entries.len());

        if removed > 0 {
            tracing::info!(
                removed = removed,
                remaining = self.inner.entries.len(),
                "Cleaned up expired link cache entries"
            );
        }

        removed
    }

    /// Sweep expired entries every `interval` until the handle is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep_expired();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub async fn get_stats(&self) -> CacheStats {
        self.inner.stats.read().await.clone()
    }

    /// Log cache statistics (for periodic monitoring)
    pub async fn log_stats(&self) {
        let stats = self.get_stats().await;
        let lookups = stats.hits + stats.misses;
        let hit_rate = if lookups > 0 {
            (stats.hits as f32 / lookups as f32 * 100.0) as u32
        } else {
            0
        };

        tracing::info!(
            entries = self.len(),
            hit_rate = hit_rate,
            hits = stats.hits,
            misses = stats.misses,
            coalesced = stats.coalesced,
            fetches = stats.fetches,
            fetch_errors = stats.fetch_errors,
            uploads = stats.uploads,
            upload_errors = stats.upload_errors,
            "Link cache statistics"
        );
    }
}

impl CacheInner {
    /// Unexpired value for `url`; expired entries are dropped on sight
    fn cached(&self, url: &str) -> Option<Arc<Metadata>> {
        let entry = self.entries.get(url)?;
        if !entry.is_expired() {
            return Some(entry.value.clone());
        }
        drop(entry);

        self.entries.remove_if(url, |_, entry| entry.is_expired());
        tracing::debug!(url = %url, "Link cache entry expired");
        None
    }

    async fn fetch_and_store(&self, url: &str) -> Result<(Arc<Metadata>, FetchStatus), FetchError> {
        let permit = self.guard.acquire(url).await;
        let result = self.fetch_locked(url).await;
        drop(permit);
        self.guard.release(url);
        result
    }

    async fn fetch_locked(&self, url: &str) -> Result<(Arc<Metadata>, FetchStatus), FetchError> {
        // Another task may have filled the slot while we waited for the guard
        if let Some(metadata) = self.cached(url) {
            self.stats.write().await.coalesced += 1;
            tracing::debug!(url = %url, "Link fetched by a concurrent lookup");
            return Ok((metadata, FetchStatus::Cached));
        }

        self.stats.write().await.fetches += 1;
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                self.stats.write().await.fetch_errors += 1;
                log_fetch_error("fetch", url, &e);
                return Err(e);
            }
        };

        let mut metadata = extract(&page.body, page.content_type.as_deref(), url);

        if let Some(image) = metadata.relocatable_image().map(str::to_string) {
            self.stats.write().await.uploads += 1;
            match relocate(self.media.as_ref(), &image).await {
                Ok(uploaded) => metadata.uploaded_image_ref = Some(uploaded),
                Err(e) => {
                    self.stats.write().await.upload_errors += 1;
                    log_fetch_error("relocate", url, &e);
                }
            }
        }

        let value = Arc::new(metadata);
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                key: url.to_string(),
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );

        tracing::info!(
            url = %url,
            title = ?value.title,
            has_image = value.uploaded_image_ref.is_some(),
            "Fetched and cached link metadata"
        );

        Ok((value, FetchStatus::Fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedPage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    /// Serves canned pages keyed by the last path segment:
    /// `/500` fails, `/timeout` times out after the delay, `/img` carries an
    /// image, `/noimg-empty` carries an empty image tag.
    #[derive(Default)]
    struct StubFetcher {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl StubFetcher {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let image = if url.ends_with("/img") {
                r#"<meta property="og:image" content="http://example.com/a.png">"#
            } else if url.ends_with("/noimg-empty") {
                r#"<meta property="og:image" content="">"#
            } else {
                ""
            };

            if url.ends_with("/500") {
                Err(FetchError::BadStatus(500))
            } else if url.ends_with("/timeout") {
                Err(FetchError::Timeout)
            } else {
                Ok(FetchedPage {
                    body: format!(
                        r#"<html><head><meta property="og:title" content="{url}">{image}</head></html>"#
                    )
                    .into_bytes(),
                    content_type: Some("text/html".to_string()),
                })
            }
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MediaStore for RecordingStore {
        async fn upload(&self, remote_url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(FetchError::Upload("store unavailable".to_string()))
            } else {
                Ok(format!("mxc://local/{}", remote_url.len()))
            }
        }
    }

    fn cache_with(
        fetcher: &Arc<StubFetcher>,
        store: &Arc<RecordingStore>,
        guard: FetchGuardMode,
    ) -> FetchCache {
        FetchCache::with_options(fetcher.clone(), store.clone(), TTL, guard)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_lookup_within_ttl_hits_cache() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let first = cache.resolve("http://example.com/a").await;
        tokio::time::advance(TTL / 2).await;
        let second = cache.resolve("http://example.com/a").await;

        assert_eq!(first.status, FetchStatus::Fresh);
        assert_eq!(second.status, FetchStatus::Cached);
        assert_eq!(fetcher.calls(), 1);

        let (first, second) = (first.metadata.unwrap(), second.metadata.unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.title.as_deref(), Some("http://example.com/a"));

        let stats = cache.get_stats().await;
        assert_eq!((stats.hits, stats.misses, stats.fetches), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched_once() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let first = cache.get_or_fetch("http://example.com/a").await.unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        let second = cache.get_or_fetch("http://example.com/a").await.unwrap();
        let third = cache.get_or_fetch("http://example.com/a").await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(*first, *second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let first = cache.get_or_fetch("http://example.com/500").await;
        let second = cache.get_or_fetch("http://example.com/500").await;

        assert!(matches!(first, Err(FetchError::BadStatus(500))));
        assert!(matches!(second, Err(FetchError::BadStatus(500))));
        assert_eq!(fetcher.calls(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.get_stats().await.fetch_errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_is_relocated() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let meta = cache.get_or_fetch("http://example.com/img").await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(meta.image_ref.as_deref(), Some("http://example.com/a.png"));
        assert_eq!(meta.uploaded_image_ref.as_deref(), Some("mxc://local/24"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_or_empty_image_never_uploads() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let plain = cache.get_or_fetch("http://example.com/plain").await.unwrap();
        let empty = cache
            .get_or_fetch("http://example.com/noimg-empty")
            .await
            .unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(plain.uploaded_image_ref, None);
        assert_eq!(empty.image_ref, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_keeps_other_fields() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let meta = cache.get_or_fetch("http://example.com/img").await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("http://example.com/img"));
        assert_eq!(meta.image_ref.as_deref(), Some("http://example.com/a.png"));
        assert_eq!(meta.uploaded_image_ref, None);

        // The partial result is cached like any other success
        cache.get_or_fetch("http://example.com/img").await.unwrap();
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.get_stats().await.upload_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_url_guard_collapses_duplicate_lookups() {
        let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(50)));
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let (a, b) = tokio::join!(
            cache.get_or_fetch("http://example.com/a"),
            cache.get_or_fetch("http://example.com/a"),
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.get_stats().await.coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_url_guard_fetches_different_urls_in_parallel() {
        let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(50)));
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let (a, b) = tokio::join!(
            cache.get_or_fetch("http://example.com/a"),
            cache.get_or_fetch("http://example.com/b"),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_guard_serializes_unrelated_urls() {
        let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(50)));
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::Global);

        let (a, b) = tokio::join!(
            cache.get_or_fetch("http://example.com/a"),
            cache.get_or_fetch("http://example.com/b"),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_guard_released_after_timeout() {
        let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_secs(3)));
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::Global);

        let started = Instant::now();
        let (slow, next) = tokio::join!(
            cache.get_or_fetch("http://example.com/timeout"),
            cache.get_or_fetch("http://example.com/a"),
        );

        assert!(matches!(slow, Err(FetchError::Timeout)));
        assert!(next.is_ok());
        // The healthy lookup waited out the failing one: a hang in the
        // fetch layer delays every miss behind the global guard.
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_lookup_still_populates_cache() {
        let fetcher = Arc::new(StubFetcher::with_delay(Duration::from_millis(100)));
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_fetch("http://example.com/a"),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.len(), 1);

        cache.get_or_fetch("http://example.com/a").await.unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_only_expired_entries() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        cache.get_or_fetch("http://example.com/old").await.unwrap();
        tokio::time::advance(TTL - Duration::from_secs(10)).await;
        cache.get_or_fetch("http://example.com/new").await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let fetcher = Arc::new(StubFetcher::default());
        let store = Arc::new(RecordingStore::default());
        let cache = cache_with(&fetcher, &store, FetchGuardMode::PerUrl);

        cache.get_or_fetch("http://example.com/a").await.unwrap();
        let sweeper = cache.spawn_sweeper(Duration::from_secs(600));

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert!(cache.is_empty());

        sweeper.abort();
    }
}
