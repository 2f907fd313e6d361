// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use thiserror::Error;

use crate::blocks::TipSet;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("tipset at epoch {epoch} added out of order, head is at {head}")]
    AddOutOfOrder { epoch: i64, head: i64 },
    #[error("reverted tipset {0} is not the cache head")]
    RevertOutOfOrder(String),
    #[error("tipset cache is empty")]
    CacheEmpty,
}

/// Fixed capacity ring of the most recent tipsets, ordered by epoch from tail to head.
///
/// Tipsets leave the cache at the tail once `capacity` newer tipsets have been
/// added, which is when they are considered final. A zero capacity cache
/// retains nothing and hands every added tipset straight back.
#[derive(Debug)]
pub struct TipSetCache {
    buffer: Vec<Option<Arc<TipSet>>>,
    idx_head: usize,
    len: usize,
}

impl TipSetCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![None; capacity],
            idx_head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn prev(&self, idx: usize) -> usize {
        (idx + self.capacity() - 1) % self.capacity()
    }

    fn next(&self, idx: usize) -> usize {
        (idx + 1) % self.capacity()
    }

    /// Pushes a new head. Returns the tail evicted to make room, if any.
    pub fn add(&mut self, ts: Arc<TipSet>) -> Result<Option<Arc<TipSet>>, Error> {
        if self.capacity() == 0 {
            return Ok(Some(ts));
        }
        if let Ok(head) = self.head()
            && ts.epoch() <= head.epoch()
        {
            return Err(Error::AddOutOfOrder {
                epoch: ts.epoch(),
                head: head.epoch(),
            });
        }
        let next = self.next(self.idx_head);
        let evicted = if self.len == self.capacity() {
            self.buffer[next].take()
        } else {
            self.len += 1;
            None
        };
        self.buffer[next] = Some(ts);
        self.idx_head = next;
        Ok(evicted)
    }

    /// Drops the head, which must be `ts`. Reverting on an empty cache is a no-op.
    pub fn revert(&mut self, ts: &TipSet) -> Result<(), Error> {
        if self.len == 0 {
            return Ok(());
        }
        let head = self.head()?;
        if head.key() != ts.key() {
            return Err(Error::RevertOutOfOrder(ts.key().to_string()));
        }
        self.buffer[self.idx_head] = None;
        self.idx_head = self.prev(self.idx_head);
        self.len -= 1;
        Ok(())
    }

    /// Makes `ts` the head, dropping any cached tipsets above its epoch and
    /// replacing a cached tipset at the same epoch.
    pub fn set_current(&mut self, ts: Arc<TipSet>) -> Option<Arc<TipSet>> {
        if self.capacity() == 0 {
            return Some(ts);
        }
        while let Ok(head) = self.head()
            && head.epoch() > ts.epoch()
        {
            self.buffer[self.idx_head] = None;
            self.idx_head = self.prev(self.idx_head);
            self.len -= 1;
        }
        if let Ok(head) = self.head()
            && head.epoch() == ts.epoch()
        {
            self.buffer[self.idx_head] = Some(ts);
            return None;
        }
        // the head is now strictly below `ts`
        self.add(ts).unwrap_or_default()
    }

    pub fn head(&self) -> Result<&Arc<TipSet>, Error> {
        if self.len == 0 {
            return Err(Error::CacheEmpty);
        }
        self.buffer[self.idx_head].as_ref().ok_or(Error::CacheEmpty)
    }

    pub fn tail(&self) -> Result<&Arc<TipSet>, Error> {
        if self.len == 0 {
            return Err(Error::CacheEmpty);
        }
        let idx = (self.idx_head + self.capacity() - (self.len - 1)) % self.capacity();
        self.buffer[idx].as_ref().ok_or(Error::CacheEmpty)
    }

    pub fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::tipset_at;
    use quickcheck_macros::quickcheck;

    fn epochs(cache: &TipSetCache) -> (i64, i64) {
        (
            cache.tail().unwrap().epoch(),
            cache.head().unwrap().epoch(),
        )
    }

    #[test]
    fn revert_head() {
        let mut cache = TipSetCache::new(3);
        for epoch in [14, 15, 16] {
            assert_eq!(cache.add(tipset_at(epoch)).unwrap(), None);
        }
        cache.revert(&tipset_at(16)).unwrap();
        assert_eq!(cache.head().unwrap().epoch(), 15);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.tail().unwrap().epoch(), 14);
        assert!(matches!(
            cache.revert(&tipset_at(14)),
            Err(Error::RevertOutOfOrder(_))
        ));
    }

    #[test]
    fn full_cache_evicts_tail() {
        let mut cache = TipSetCache::new(2);
        assert_eq!(cache.add(tipset_at(1)).unwrap(), None);
        assert_eq!(cache.add(tipset_at(2)).unwrap(), None);
        let evicted = cache.add(tipset_at(3)).unwrap().unwrap();
        assert_eq!(evicted.epoch(), 1);
        assert_eq!(epochs(&cache), (2, 3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn out_of_order_add() {
        let mut cache = TipSetCache::new(2);
        cache.add(tipset_at(5)).unwrap();
        assert_eq!(
            cache.add(tipset_at(5)),
            Err(Error::AddOutOfOrder { epoch: 5, head: 5 })
        );
        assert!(cache.add(tipset_at(4)).is_err());
    }

    #[test]
    fn zero_capacity_is_pass_through() {
        let mut cache = TipSetCache::new(0);
        let ts = tipset_at(9);
        assert_eq!(cache.add(ts.clone()).unwrap(), Some(ts.clone()));
        assert_eq!(cache.set_current(ts.clone()), Some(ts));
        assert_eq!(cache.head(), Err(Error::CacheEmpty));
        assert_eq!(cache.tail(), Err(Error::CacheEmpty));
    }

    #[test]
    fn empty_cache() {
        let mut cache = TipSetCache::new(4);
        assert_eq!(cache.head(), Err(Error::CacheEmpty));
        assert_eq!(cache.tail(), Err(Error::CacheEmpty));
        cache.revert(&tipset_at(1)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn set_current_drops_higher_and_replaces_equal() {
        let mut cache = TipSetCache::new(4);
        for epoch in [10, 11, 12, 13] {
            cache.add(tipset_at(epoch)).unwrap();
        }
        let fork = tipset_at(11);
        assert_eq!(cache.set_current(fork.clone()), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.head().unwrap(), &fork);
        assert_eq!(epochs(&cache), (10, 11));

        assert_eq!(cache.set_current(tipset_at(20)), None);
        assert_eq!(epochs(&cache), (10, 20));
    }

    #[test]
    fn reset_empties() {
        let mut cache = TipSetCache::new(2);
        cache.add(tipset_at(1)).unwrap();
        cache.reset();
        assert!(cache.is_empty());
        cache.add(tipset_at(0)).unwrap();
        assert_eq!(epochs(&cache), (0, 0));
    }

    #[quickcheck]
    fn monotonic_window(capacity: u8, steps: Vec<u8>) -> bool {
        let capacity = usize::from(capacity % 8);
        let mut cache = TipSetCache::new(capacity);
        let mut epoch = 0i64;
        for step in steps {
            epoch += i64::from(step % 3) + 1;
            if step % 5 == 0 && !cache.is_empty() {
                let head = cache.head().unwrap().clone();
                cache.revert(&head).unwrap();
                continue;
            }
            let _ = cache.add(tipset_at(epoch));
            if cache.len() > capacity {
                return false;
            }
            if let (Ok(tail), Ok(head)) = (cache.tail(), cache.head())
                && tail.epoch() > head.epoch()
            {
                return false;
            }
        }
        true
    }
}
