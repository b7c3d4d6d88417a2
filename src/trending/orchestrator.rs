// Trending fetch orchestration.
// Cache lookup, legacy migration, bounded upstream fan-out, and stale fallback.

use std::sync::Arc;

use chrono::Local;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheEngine, PersistentStore, Placement};
use crate::error::Result;
use crate::github::{TrendingItem, TrendingSource};
use crate::state::TrendingState;

use super::period::{Period, current_period};
use super::query::{Query, ttl_for};
use super::record::TrendingRecord;

/// Result of consulting one storage tier for a query.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(Vec<TrendingItem>),
    Miss,
    /// Usable but past its lifetime.
    Stale(Vec<TrendingItem>),
}

/// Where a served listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Legacy,
    Upstream,
    StaleFallback,
}

/// A listing handed back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Served {
    pub items: Vec<TrendingItem>,
    pub source: ServedFrom,
}

/// Serves trending queries from cache, falling back to the upstream feed.
///
/// Concurrent calls for the same query are not coalesced: both may miss and
/// both may go upstream.
pub struct TrendingFetcher<S, U> {
    cache: Arc<CacheEngine<S>>,
    source: U,
    state: TrendingState,
    concurrency: usize,
}

impl<S: PersistentStore, U: TrendingSource> TrendingFetcher<S, U> {
    pub fn new(cache: Arc<CacheEngine<S>>, source: U, state: TrendingState) -> Self {
        Self {
            cache,
            source,
            state,
            concurrency: 3,
        }
    }

    /// Maximum number of upstream requests in flight at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<CacheEngine<S>> {
        &self.cache
    }

    pub fn state(&self) -> &TrendingState {
        &self.state
    }

    /// Serve `query`, publishing the listing to the shared state on success.
    ///
    /// Fails only when the upstream fetch fails and no fallback listing
    /// exists; the upstream error is returned in that case.
    pub async fn fetch(&self, query: &Query) -> Result<Served> {
        let cache_key = query.cache_key()?;
        let legacy_keys = query.legacy_keys()?;

        if let CacheLookup::Hit(items) = self.lookup_cache(&cache_key) {
            debug!(key = %cache_key, "trending cache hit");
            return Ok(self.serve(items, ServedFrom::Cache));
        }

        if let CacheLookup::Hit(items) = self.migrate_legacy(query, &cache_key, &legacy_keys) {
            return Ok(self.serve(items, ServedFrom::Legacy));
        }

        match self.fetch_upstream(query).await {
            Ok(items) => {
                let record = TrendingRecord::new(items, self.period(), self.cache.now());
                self.cache.set(
                    &cache_key,
                    &record,
                    ttl_for(query.since()),
                    Placement::WriteThrough,
                )?;
                Ok(self.serve(record.repos, ServedFrom::Upstream))
            }
            Err(e) => {
                error!(error = %e, "failed to fetch trending data");
                match self.stale_fallback(&legacy_keys) {
                    CacheLookup::Stale(items) | CacheLookup::Hit(items) => {
                        info!("using expired cache data due to fetch failure");
                        Ok(self.serve(items, ServedFrom::StaleFallback))
                    }
                    CacheLookup::Miss => Err(e),
                }
            }
        }
    }

    fn lookup_cache(&self, cache_key: &str) -> CacheLookup {
        match self.cache.get::<TrendingRecord>(cache_key) {
            Some(record) if !record.repos.is_empty() => CacheLookup::Hit(record.repos),
            _ => CacheLookup::Miss,
        }
    }

    /// Move a current legacy record into the cache, consuming the legacy key.
    fn migrate_legacy(
        &self,
        query: &Query,
        cache_key: &str,
        legacy_keys: &[String],
    ) -> CacheLookup {
        let period = self.period();
        let Some((raw_key, record)) = legacy_keys.iter().find_map(|key| {
            self.read_raw(key)
                .filter(|r| !r.repos.is_empty() && r.is_current(query.since(), period))
                .map(|r| (key, r))
        }) else {
            return CacheLookup::Miss;
        };

        let migrated = TrendingRecord::new(record.repos, period, self.cache.now());
        if let Err(e) = self.cache.set(
            cache_key,
            &migrated,
            ttl_for(query.since()),
            Placement::WriteThrough,
        ) {
            warn!(key = %cache_key, error = %e, "failed to migrate legacy trending record");
            return CacheLookup::Miss;
        }
        if let Err(e) = self.cache.store().remove(raw_key) {
            warn!(key = %raw_key, error = %e, "failed to remove legacy trending record");
        }

        info!(key = %raw_key, "migrated legacy trending record");
        CacheLookup::Hit(migrated.repos)
    }

    /// Request every language of `query`, at most `concurrency` at a time.
    ///
    /// A single failure fails the whole fetch. Per-language results are
    /// concatenated in completion order and sorted by `added`, descending;
    /// the sort is stable, so ties keep completion order.
    async fn fetch_upstream(&self, query: &Query) -> Result<Vec<TrendingItem>> {
        let since = query.since();
        let category = query.category();

        if query.is_all_languages() {
            return self.source.fetch_trending("", since, category).await;
        }

        let batches: Vec<Vec<TrendingItem>> = stream::iter(query.fetch_languages())
            .map(|lang| self.source.fetch_trending(lang, since, category))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut items: Vec<TrendingItem> = batches.into_iter().flatten().collect();
        items.sort_by(|a, b| b.added.cmp(&a.added));
        Ok(items)
    }

    /// Whatever listing sits under an unprefixed key, regardless of age.
    fn stale_fallback(&self, legacy_keys: &[String]) -> CacheLookup {
        legacy_keys
            .iter()
            .filter_map(|key| self.read_raw(key))
            .find(|record| !record.repos.is_empty())
            .map_or(CacheLookup::Miss, |record| CacheLookup::Stale(record.repos))
    }

    fn read_raw(&self, raw_key: &str) -> Option<TrendingRecord> {
        let value = match self.cache.store().get(raw_key) {
            Ok(value) => value?,
            Err(e) => {
                warn!(key = %raw_key, error = %e, "failed to read unprefixed trending record");
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %raw_key, error = %e, "skipping corrupt trending record");
                None
            }
        }
    }

    fn period(&self) -> Period {
        current_period(self.cache.now().with_timezone(&Local).naive_local())
    }

    fn serve(&self, items: Vec<TrendingItem>, source: ServedFrom) -> Served {
        self.state.publish(items.clone());
        Served { items, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, MemoryStore};
    use crate::config::CacheConfig;
    use crate::error::GtrendError;
    use crate::github::{Category, Since};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted upstream that records how many requests overlap.
    #[derive(Default)]
    struct FakeSource {
        responses: HashMap<String, Vec<u64>>,
        failing: Vec<String>,
        delays_ms: HashMap<String, u64>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn with(mut self, lang: &str, added: &[u64]) -> Self {
            self.responses.insert(lang.to_string(), added.to_vec());
            self
        }

        fn failing(mut self, lang: &str) -> Self {
            self.failing.push(lang.to_string());
            self
        }

        fn delay(mut self, lang: &str, ms: u64) -> Self {
            self.delays_ms.insert(lang.to_string(), ms);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TrendingSource for FakeSource {
        async fn fetch_trending(
            &self,
            language: &str,
            _since: Option<Since>,
            _category: Category,
        ) -> Result<Vec<TrendingItem>> {
            self.calls.lock().unwrap().push(language.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays_ms.get(language).copied().unwrap_or(10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|l| l == language) {
                return Err(GtrendError::Status {
                    status: 502,
                    url: format!("https://trending.test/repositories?language={language}"),
                });
            }

            Ok(self
                .responses
                .get(language)
                .map(|added| {
                    added
                        .iter()
                        .map(|&n| TrendingItem::new(n).with_field("language", language))
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn fetcher(source: FakeSource) -> (TrendingFetcher<MemoryStore, FakeSource>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let cache = Arc::new(CacheEngine::with_clock(
            CacheConfig::default(),
            MemoryStore::new(),
            Arc::new(clock.clone()),
        ));
        (TrendingFetcher::new(cache, source, TrendingState::new()), clock)
    }

    fn daily(langs: &[&str]) -> Query {
        Query::new(langs.iter().copied(), Some(Since::Daily), Category::Repositories)
    }

    fn added(items: &[TrendingItem]) -> Vec<u64> {
        items.iter().map(|i| i.added).collect()
    }

    fn legacy_record(
        fetcher: &TrendingFetcher<MemoryStore, FakeSource>,
        added: &[u64],
    ) -> TrendingRecord {
        TrendingRecord::new(
            added.iter().map(|&n| TrendingItem::new(n)).collect(),
            fetcher.period(),
            fetcher.cache().now(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_respects_concurrency_and_sorts() {
        let source = FakeSource::default()
            .with("c", &[5, 1])
            .with("go", &[7])
            .with("java", &[2, 9, 3])
            .with("python", &[4])
            .with("rust", &[8, 6])
            .delay("go", 30)
            .delay("java", 5);
        let (fetcher, _clock) = fetcher(source);
        let query = daily(&["rust", "go", "c", "java", "python"]);

        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::Upstream);
        assert_eq!(added(&served.items), vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(fetcher.source.calls().len(), 5);
        assert_eq!(fetcher.source.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_languages_issues_single_unscoped_request() {
        let source = FakeSource::default().with("", &[1, 3, 2]).with("rust", &[100]);
        let (fetcher, _clock) = fetcher(source);

        let served = fetcher.fetch(&daily(&["rust", ""])).await.unwrap();

        assert_eq!(fetcher.source.calls(), vec!["".to_string()]);
        // Unscoped listings keep upstream order
        assert_eq!(added(&served.items), vec![1, 3, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_is_served_from_cache() {
        let (fetcher, clock) = fetcher(FakeSource::default().with("rust", &[1]));
        let query = daily(&["rust"]);

        fetcher.fetch(&query).await.unwrap();
        clock.advance(Duration::from_secs(60 * 60));
        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::Cache);
        assert_eq!(fetcher.source.calls().len(), 1);
        assert_eq!(fetcher.state().current(), served.items);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_listing_expires_after_two_hours() {
        let (fetcher, clock) = fetcher(FakeSource::default().with("rust", &[1]));
        let query = daily(&["rust"]);

        fetcher.fetch(&query).await.unwrap();
        clock.advance(Duration::from_secs(2 * 60 * 60));
        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::Upstream);
        assert_eq!(fetcher.source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_cached_listing_is_a_miss() {
        let (fetcher, _clock) = fetcher(FakeSource::default().with("rust", &[4]));
        let query = daily(&["rust"]);
        let empty = TrendingRecord::new(vec![], fetcher.period(), fetcher.cache().now());
        fetcher
            .cache()
            .set(
                &query.cache_key().unwrap(),
                &empty,
                Duration::from_secs(3600),
                Placement::WriteThrough,
            )
            .unwrap();

        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::Upstream);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_legacy_record_migrates_once() {
        let (fetcher, clock) = fetcher(FakeSource::default().with("rust", &[99]));
        let query = daily(&["rust"]);
        let raw_key = query.raw_key().unwrap();
        let legacy = legacy_record(&fetcher, &[3, 2]);
        fetcher
            .cache()
            .store()
            .set(&raw_key, &serde_json::to_value(&legacy).unwrap())
            .unwrap();

        let first = fetcher.fetch(&query).await.unwrap();
        assert_eq!(first.source, ServedFrom::Legacy);
        assert_eq!(added(&first.items), vec![3, 2]);
        assert!(fetcher.cache().store().get(&raw_key).unwrap().is_none());

        // Migrated with the daily TTL
        let entry = fetcher.cache().get_entry(&query.cache_key().unwrap()).unwrap();
        assert_eq!(entry.expires_at - entry.created_at, chrono::Duration::hours(2));

        clock.advance(Duration::from_secs(60));
        let second = fetcher.fetch(&query).await.unwrap();
        assert_eq!(second.source, ServedFrom::Cache);
        assert_eq!(added(&second.items), vec![3, 2]);
        assert!(fetcher.source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_outdated_legacy_record_is_ignored() {
        let (fetcher, _clock) = fetcher(FakeSource::default().with("rust", &[99]));
        let query = daily(&["rust"]);
        let raw_key = query.raw_key().unwrap();
        let mut legacy = legacy_record(&fetcher, &[3]);
        legacy.day = legacy.day.map(|d| d % 28 + 1);
        fetcher
            .cache()
            .store()
            .set(&raw_key, &serde_json::to_value(&legacy).unwrap())
            .unwrap();

        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::Upstream);
        assert_eq!(added(&served.items), vec![99]);
        // Left in place for the stale fallback
        assert!(fetcher.cache().store().get(&raw_key).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_serves_stale_raw_record() {
        let source = FakeSource::default().with("rust", &[1]).failing("go");
        let (fetcher, _clock) = fetcher(source);
        let query = Query::new(["rust", "go"], Some(Since::Weekly), Category::Repositories);
        let mut stale = legacy_record(&fetcher, &[42, 41]);
        stale.week = Some(0);
        fetcher
            .cache()
            .store()
            .set(&query.raw_key().unwrap(), &serde_json::to_value(&stale).unwrap())
            .unwrap();

        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::StaleFallback);
        assert_eq!(added(&served.items), vec![42, 41]);
        assert_eq!(fetcher.state().current(), served.items);
        assert!(!fetcher.cache().has(&query.cache_key().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_found_under_caller_language_order() {
        let (fetcher, _clock) = fetcher(FakeSource::default().failing("rust").failing("go"));
        let query = Query::new(["rust", "go"], Some(Since::Weekly), Category::Repositories);
        let key = r#"{"lang":["rust","go"],"since":"weekly","type":"repositories"}"#;
        fetcher
            .cache()
            .store()
            .set(key, &serde_json::json!({"repos": [{"name": "old"}], "toWeek": 0}))
            .unwrap();

        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::StaleFallback);
        assert_eq!(served.items[0].title(), "old");
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_record_under_sorted_order_migrates() {
        let (fetcher, _clock) = fetcher(FakeSource::default());
        let query = daily(&["rust", "go"]);
        let sorted_key = r#"{"lang":["go","rust"],"since":"daily","type":"repositories"}"#;
        let legacy = legacy_record(&fetcher, &[5]);
        fetcher
            .cache()
            .store()
            .set(sorted_key, &serde_json::to_value(&legacy).unwrap())
            .unwrap();

        let served = fetcher.fetch(&query).await.unwrap();

        assert_eq!(served.source, ServedFrom::Legacy);
        assert!(fetcher.cache().store().get(sorted_key).unwrap().is_none());
        assert!(fetcher.source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_fallback_surfaces_error() {
        let (fetcher, _clock) = fetcher(FakeSource::default().with("rust", &[1]).failing("go"));
        let query = daily(&["go", "rust"]);

        let err = fetcher.fetch(&query).await.unwrap_err();

        assert!(matches!(err, GtrendError::Status { status: 502, .. }));
        assert!(fetcher.state().current().is_empty());
        assert!(!fetcher.cache().has(&query.cache_key().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_raw_record_is_not_a_fallback() {
        let (fetcher, _clock) = fetcher(FakeSource::default().failing(""));
        let query = Query::all(Some(Since::Monthly), Category::Developers);
        fetcher
            .cache()
            .store()
            .insert_raw(&query.raw_key().unwrap(), "{truncated");

        assert!(fetcher.fetch(&query).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_floor_is_one() {
        let source = FakeSource::default().with("a", &[1]).with("b", &[2]);
        let (fetcher, _clock) = fetcher(source);
        let fetcher = fetcher.with_concurrency(0);

        let served = fetcher.fetch(&daily(&["a", "b"])).await.unwrap();

        assert_eq!(added(&served.items), vec![2, 1]);
        assert_eq!(fetcher.source.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
