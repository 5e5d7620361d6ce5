/// Bounded in-memory cache with get-or-fetch semantics
use crate::errors::ApiResult;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use tokio::sync::Mutex;
use tracing::debug;

struct Entry<V> {
    value: V,
    last_used: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    tick: u64,
}

/// Least-recently-used cache holding at most `capacity` entries.
///
/// Failed fetches are never stored. Concurrent misses for the same key may
/// both fetch; the later insert wins.
pub struct BoundedCache<K, V> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.value.clone()
        })
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock().await;
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("{} cache evicting {:?}", self.name, oldest);
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                last_used: tick,
            },
        );
    }

    /// Return the cached value or run `fetch` and remember its success
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> ApiResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<V>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }

        let value = fetch().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_get_or_fetch_hits_after_first_miss() {
        let cache = BoundedCache::new("test", 4);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = cache
                .get_or_fetch("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(10)
                })
                .await
                .unwrap();
            assert_eq!(v, 10);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache: BoundedCache<&str, u32> = BoundedCache::new("test", 4);

        let err = cache
            .get_or_fetch("k", || async { Err(ApiError::NotFound("boom".into())) })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.len().await, 0);

        let ok = cache.get_or_fetch("k", || async { Ok(1) }).await.unwrap();
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = BoundedCache::new("test", 2);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;

        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get(&"a").await, Some(1));
        cache.insert("c", 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"b").await, None);
        assert_eq!(cache.get(&"a").await, Some(1));
        assert_eq!(cache.get(&"c").await, Some(3));
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = BoundedCache::new("test", 2);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        cache.insert("a", 5).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"a").await, Some(5));
        assert_eq!(cache.get(&"b").await, Some(2));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let cache: BoundedCache<u8, u8> = BoundedCache::new("test", 0);
        assert_eq!(cache.capacity, 1);
    }
}
