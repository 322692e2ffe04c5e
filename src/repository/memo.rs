//! Per-key single-flight memoization
//!
//! The first caller for a key runs the fetch; callers arriving while it is in
//! flight wait for that same fetch instead of starting another one. A
//! successful result is kept for the lifetime of the memo. A failed fetch
//! leaves the key empty, so the next caller retries.

use rustc_hash::FxHashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use crate::error::Result;

pub struct Memo<K, V> {
    cells: Mutex<FxHashMap<K, Arc<OnceCell<V>>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Memo<K, V> {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(FxHashMap::default()),
        }
    }

    /// The completed value for `key`, if any
    pub fn get(&self, key: &K) -> Option<V> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Return the value for `key`, running `fetch` only if no value exists
    /// and no other fetch for `key` is in flight
    pub async fn get_or_fetch<F, Fut>(&self, key: &K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        // The map lock is never held across an await
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            cells.entry(key.clone()).or_default().clone()
        };
        cell.get_or_try_init(fetch).await.cloned()
    }

    /// Number of keys with a completed value
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for Memo<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let memo: Memo<String, u32> = Memo::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let key = "pack-1".to_string();

        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            // Suspend so the second caller arrives while this one is in flight
            tokio::task::yield_now().await;
            Ok(42)
        };

        let (a, b) = tokio::join!(memo.get_or_fetch(&key, fetch), memo.get_or_fetch(&key, fetch));
        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Later callers are served from the memo
        let c = memo.get_or_fetch(&key, fetch).await.unwrap();
        assert_eq!(c, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.get(&key), Some(42));
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_separately() {
        let memo: Memo<&'static str, usize> = Memo::new();
        let a = memo.get_or_fetch(&"a", || async { Ok(1) }).await.unwrap();
        let b = memo.get_or_fetch(&"b", || async { Ok(2) }).await.unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(memo.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let memo: Memo<&'static str, usize> = Memo::new();
        let failed = memo
            .get_or_fetch(&"a", || async { Err(Error::Store("offline".into())) })
            .await;
        assert!(failed.is_err());
        assert!(memo.is_empty());

        let value = memo.get_or_fetch(&"a", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
