//! One-time materializing cache over any retriever.
//!
//! Used for data that is read once but consumed by many pools of the same
//! feature, such as climatology or left data shared across lead windows.

use crate::error::Result;
use crate::retriever::{Capabilities, Retriever, SeriesIter};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Statistics for a caching retriever.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub materializations: u64,
    pub failures: u64,
}

/// Wraps a retriever and materializes its full bulk sequence exactly once.
///
/// Concurrent first callers block while one of them populates the cache. A
/// failed population leaves the cache empty and returns the error, so a later
/// call may try again.
pub struct CachingRetriever<T: 'static> {
    inner: Arc<dyn Retriever<T>>,
    cache: OnceCell<Arc<Vec<T>>>,
    hits: AtomicU64,
    materializations: AtomicU64,
    failures: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> CachingRetriever<T> {
    pub fn new(inner: Arc<dyn Retriever<T>>) -> Self {
        Self {
            inner,
            cache: OnceCell::new(),
            hits: AtomicU64::new(0),
            materializations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Whether the cache has been populated.
    pub fn is_cached(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            materializations: self.materializations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// The cached items, populating the cache on first use.
    pub fn cached(&self) -> Result<Arc<Vec<T>>> {
        if let Some(cached) = self.cache.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(cached));
        }

        let cached = self.cache.get_or_try_init(|| -> Result<Arc<Vec<T>>> {
            let items = self
                .inner
                .get()
                .and_then(|iter| iter.collect::<Result<Vec<T>>>())
                .map_err(|e| {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    e
                })?;
            self.materializations.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("retrieval_cache_materializations_total").increment(1);
            debug!(
                retriever = self.inner.name(),
                items = items.len(),
                "Materialized retrieval cache"
            );
            Ok(Arc::new(items))
        })?;

        Ok(Arc::clone(cached))
    }
}

impl<T: Clone + Send + Sync + 'static> Retriever<T> for CachingRetriever<T> {
    fn name(&self) -> &'static str {
        "caching retriever"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BULK_ONLY
    }

    fn get(&self) -> Result<SeriesIter<'_, T>> {
        let cached = self.cached()?;
        Ok(Box::new((0..cached.len()).map(move |i| Ok(cached[i].clone()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrieverError;
    use std::sync::atomic::AtomicBool;

    /// Counts bulk reads and optionally fails the first one.
    struct CountingRetriever {
        calls: AtomicU64,
        fail_first: AtomicBool,
    }

    impl CountingRetriever {
        fn new(fail_first: bool) -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail_first: AtomicBool::new(fail_first),
            }
        }
    }

    impl Retriever<i64> for CountingRetriever {
        fn name(&self) -> &'static str {
            "counting retriever"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::BULK_ONLY
        }

        fn get(&self) -> Result<SeriesIter<'_, i64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Ok(Box::new(
                    vec![Ok(1), Err(RetrieverError::data_access("connection reset"))].into_iter(),
                ));
            }
            Ok(Box::new(vec![Ok(1), Ok(2), Ok(3)].into_iter()))
        }
    }

    #[test]
    fn test_materializes_once_under_concurrent_access() {
        let counting = Arc::new(CountingRetriever::new(false));
        let cache = Arc::new(CachingRetriever::new(counting.clone() as Arc<dyn Retriever<i64>>));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cache = Arc::clone(&cache);
                scope.spawn(move || {
                    let items: Vec<i64> = cache.get().unwrap().collect::<Result<_>>().unwrap();
                    assert_eq!(items, vec![1, 2, 3]);
                });
            }
        });

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().materializations, 1);
        assert!(cache.is_cached());
    }

    #[test]
    fn test_failed_population_is_not_cached() {
        let counting = Arc::new(CountingRetriever::new(true));
        let cache = CachingRetriever::new(counting.clone() as Arc<dyn Retriever<i64>>);

        assert!(matches!(cache.get().map(|_| ()), Err(RetrieverError::DataAccess(_))));
        assert!(!cache.is_cached());
        assert_eq!(cache.stats().failures, 1);

        let items: Vec<i64> = cache.get().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_by_id_access_is_unsupported() {
        let cache = CachingRetriever::new(Arc::new(CountingRetriever::new(false)) as Arc<dyn Retriever<i64>>);
        assert!(matches!(cache.get_by_id(1), Err(RetrieverError::Unsupported { .. })));
        assert!(!cache.is_cached());
    }
}
