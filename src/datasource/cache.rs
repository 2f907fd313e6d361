// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::future::Future;
use std::sync::Arc;

use hashlink::LruCache;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as TokioMutex;

use crate::blocks::TipSet;
use crate::metrics::{self, KindLabel};

/// Memo key of a `(current, executed)` tipset pair.
pub fn pair_key(current: &TipSet, executed: &TipSet) -> String {
    format!("{}{}", current.key(), executed.key())
}

struct Inner<V> {
    values: LruCache<String, V>,
    pending: Vec<(String, Arc<TokioMutex<()>>)>,
}

enum Status<V> {
    Done(V),
    Empty(Arc<TokioMutex<()>>),
}

/// LRU memo where concurrent callers asking for the same key share a single
/// computation.
pub struct SingleFlightCache<V> {
    inner: SyncMutex<Inner<V>>,
    label: KindLabel,
}

impl<V: Clone> SingleFlightCache<V> {
    pub fn new(capacity: usize, label: KindLabel) -> Self {
        Self {
            inner: SyncMutex::new(Inner {
                values: LruCache::new(capacity),
                pending: Vec::with_capacity(8),
            }),
            label,
        }
    }

    pub async fn get_or_else<F, Fut>(&self, key: String, compute: F) -> anyhow::Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let status = {
            let mut inner = self.inner.lock();
            match inner.values.get(&key) {
                Some(v) => Status::Done(v.clone()),
                None => match inner.pending.iter().find(|(k, _)| k == &key) {
                    Some((_, mutex)) => Status::Empty(mutex.clone()),
                    None => {
                        let mutex = Arc::new(TokioMutex::new(()));
                        inner.pending.push((key.clone(), mutex.clone()));
                        Status::Empty(mutex)
                    }
                },
            }
        };
        match status {
            Status::Done(v) => {
                metrics::LRU_CACHE_HIT.get_or_create(&self.label).inc();
                Ok(v)
            }
            Status::Empty(mutex) => {
                let _guard = mutex.lock().await;
                if let Some(v) = self.get(&key) {
                    // computed by whoever held the lock before us
                    metrics::LRU_CACHE_HIT.get_or_create(&self.label).inc();
                    return Ok(v);
                }
                metrics::LRU_CACHE_MISS.get_or_create(&self.label).inc();
                match compute().await {
                    Ok(v) => {
                        self.insert(key, v.clone());
                        Ok(v)
                    }
                    Err(e) => {
                        self.inner.lock().pending.retain(|(k, _)| k != &key);
                        Err(e)
                    }
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().values.get(key).cloned()
    }

    fn insert(&self, key: String, value: V) {
        let mut inner = self.inner.lock();
        inner.pending.retain(|(k, _)| k != &key);
        inner.values.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::values;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(SingleFlightCache::<u64>::new(4, values::EXECUTED_MESSAGES));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_else("k".into(), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn least_recently_used_is_evicted() {
        let cache = SingleFlightCache::<usize>::new(2, values::EXECUTED_MESSAGES);
        for i in 0..3 {
            cache
                .get_or_else(i.to_string(), || async move { Ok(i) })
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("0"), None);
        assert_eq!(cache.get("2"), Some(2));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = SingleFlightCache::<usize>::new(2, values::EXECUTED_MESSAGES);
        let err = cache
            .get_or_else("k".into(), || async { anyhow::bail!("boom") })
            .await;
        assert!(err.is_err());
        let ok = cache
            .get_or_else("k".into(), || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!(ok, 1);
    }
}
