//! Time-bounded memoisation of query results
//!
//! Repeated previews of the same selection should not hit the database
//! again. [`CachedExecutor`] keys each entry on the complete request, so two
//! requests share an entry only when kind, data source, limit, date range,
//! storefronts and filters are all equal.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::Result;
use crate::table::ResultTable;

use super::{QueryExecutor, QueryRequest};

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry {
    stored_at: Instant,
    table: ResultTable,
}

/// Executor wrapper that caches successful results for a TTL
pub struct CachedExecutor<E> {
    inner: E,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<E: QueryExecutor> CachedExecutor<E> {
    /// Wrap an executor with the given time-to-live
    pub fn new(inner: E, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Number of live entries (expired entries are not counted)
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|e| now.duration_since(e.stored_at) < self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A poisoned map only means a panic mid-insert; the data is still usable
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Canonical key for a request
    ///
    /// Filters live in a `BTreeMap`, so the JSON form is order-independent.
    fn cache_key(request: &QueryRequest) -> String {
        serde_json::to_string(request).unwrap_or_else(|_| format!("{request:?}"))
    }

    fn lookup(&self, key: &str) -> Option<ResultTable> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.table.clone()),
            Some(_) => {
                trace!("Evicting expired cache entry");
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl<E: QueryExecutor> QueryExecutor for CachedExecutor<E> {
    async fn execute(&self, request: &QueryRequest) -> Result<ResultTable> {
        let key = Self::cache_key(request);

        if let Some(table) = self.lookup(&key) {
            debug!(
                "Cache hit for {} query on {} ({})",
                request.kind, request.data_source, request.params.range
            );
            return Ok(table);
        }

        let table = self.inner.execute(request).await?;
        let mut entries = self.lock();
        entries.retain(|_, e| e.stored_at.elapsed() < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                table: table.clone(),
            },
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use crate::executor::QueryParams;
    use crate::range::DateRange;
    use crate::table::{Column, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn execute(&self, _request: &QueryRequest) -> Result<ResultTable> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExecutorError::ConnectionFailed("down".into()).into());
            }
            ResultTable::from_columns(vec![Column::new("n", vec![Value::Int(n as i64)])])
        }
    }

    fn request(start: &str) -> QueryRequest {
        QueryRequest::data(
            "keyword_lab",
            QueryParams::new(DateRange::parse(start, "2024-02-01").unwrap()).with_storefronts([1]),
        )
    }

    #[tokio::test]
    async fn test_identical_requests_hit_cache() {
        let cached = CachedExecutor::new(CountingExecutor::default(), DEFAULT_TTL);
        let first = cached.execute(&request("2024-01-01")).await.unwrap();
        let second = cached.execute(&request("2024-01-01")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_different_range_misses_cache() {
        let cached = CachedExecutor::new(CountingExecutor::default(), DEFAULT_TTL);
        cached.execute(&request("2024-01-01")).await.unwrap();
        cached.execute(&request("2024-01-02")).await.unwrap();
        cached
            .execute(&request("2024-01-01").with_limit(500))
            .await
            .unwrap();

        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_expired_entries_refetch() {
        let cached = CachedExecutor::new(CountingExecutor::default(), Duration::ZERO);
        cached.execute(&request("2024-01-01")).await.unwrap();
        cached.execute(&request("2024-01-01")).await.unwrap();

        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_insert_prunes_expired_entries() {
        let cached = CachedExecutor::new(CountingExecutor::default(), Duration::from_millis(20));
        cached.execute(&request("2024-01-01")).await.unwrap();
        cached.execute(&request("2024-01-02")).await.unwrap();
        assert_eq!(cached.entries.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cached.execute(&request("2024-01-03")).await.unwrap();
        assert_eq!(cached.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = CountingExecutor {
            fail: true,
            ..Default::default()
        };
        let cached = CachedExecutor::new(inner, DEFAULT_TTL);
        assert!(cached.execute(&request("2024-01-01")).await.is_err());
        assert!(cached.execute(&request("2024-01-01")).await.is_err());

        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
        assert!(cached.is_empty());
    }
}
