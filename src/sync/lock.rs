//! Per-source and per-data-source locking.
//!
//! Two distinct locks are modeled, both keyed lazily so the registry
//! never grows beyond the sources actually touched in a process
//! lifetime:
//! - a per-`(source_type, source_id)` lock serializing `replace` calls
//!   against the same source (spec.md §5),
//! - a per-`data_source_id` lock serializing sync-state row
//!   read-modify-writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// A lazily-populated registry of named async locks.
#[derive(Default)]
pub struct KeyedLockRegistry {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Acquire the lock for `key`, blocking concurrent callers using the
    /// same key until the returned guard is dropped.
    pub async fn acquire(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_waits_for_first_release() {
        let registry = Arc::new(KeyedLockRegistry::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let r1 = registry.clone();
        let o1 = order.clone();
        let first = tokio::spawn(async move {
            let _guard = r1.acquire("notion:page-1").await;
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            o1.lock().unwrap().push(1);
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let r2 = registry.clone();
        let o2 = order.clone();
        let second = tokio::spawn(async move {
            let _guard = r2.acquire("notion:page-1").await;
            o2.lock().unwrap().push(2);
        });

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let registry = KeyedLockRegistry::new();
        let a = registry.acquire("notion:page-1").await;
        let b = registry.acquire("notion:page-2").await;
        drop(a);
        drop(b);
    }
}
