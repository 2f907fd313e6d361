// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Drivers feeding tipsets to a [`TipSetObserver`]: the [`Walker`] goes
//! down a height range, the [`Watcher`] follows the head.

use std::sync::Arc;

use anyhow::Context as _;
use futures::TryStreamExt as _;
use tracing::{debug, info, warn};

use crate::blocks::TipSet;
use crate::chain::HeadChange;
use crate::chain::tipset_cache::{self, TipSetCache};
use crate::datasource::DataSource;
use crate::index::TipSetObserver;
use crate::metrics;
use crate::shim::clock::ChainEpoch;

/// Hands the tipsets in `[min, max]` to the observer, highest first.
pub struct Walker {
    ds: Arc<DataSource>,
    obs: Arc<dyn TipSetObserver>,
    min: ChainEpoch,
    max: ChainEpoch,
}

impl Walker {
    pub fn new(
        ds: Arc<DataSource>,
        obs: Arc<dyn TipSetObserver>,
        min: ChainEpoch,
        max: ChainEpoch,
    ) -> Self {
        Self { ds, obs, min, max }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.min <= self.max,
            "min height {} is above max height {}",
            self.min,
            self.max
        );
        let head = self.ds.chain_head().await?;
        let mut ts = if self.max >= head.epoch() {
            head
        } else {
            self.ds.tipset_by_height(self.max, head.key()).await?
        };
        info!("walking from height {} down to {}", ts.epoch(), self.min);
        loop {
            if ts.epoch() < self.min {
                break;
            }
            // a null round at `max` resolves to a later tipset
            if ts.epoch() <= self.max {
                self.obs.tip_set(ts.clone()).await?;
            }
            if ts.epoch() == 0 || ts.parents().is_empty() {
                break;
            }
            ts = self
                .ds
                .tipset(ts.parents())
                .await
                .with_context(|| format!("loading the parent of height {}", ts.epoch()))?;
        }
        Ok(())
    }
}

/// Follows head changes and hands a tipset to the observer once
/// `confidence` newer tipsets have been applied on top of it.
pub struct Watcher {
    ds: Arc<DataSource>,
    obs: Arc<dyn TipSetObserver>,
    cache: TipSetCache,
}

impl Watcher {
    pub fn new(ds: Arc<DataSource>, obs: Arc<dyn TipSetObserver>, confidence: usize) -> Self {
        Self {
            ds,
            obs,
            cache: TipSetCache::new(confidence),
        }
    }

    /// Runs until the notification stream ends.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut changes = self.ds.node().chain_notify().await?;
        info!(
            "watching the chain head with confidence {}",
            self.cache.capacity()
        );
        while let Some(batch) = changes.try_next().await? {
            for change in batch {
                self.apply(change).await?;
            }
        }
        info!("head notifications ended");
        Ok(())
    }

    async fn apply(&mut self, change: HeadChange) -> anyhow::Result<()> {
        let confirmed = match change {
            HeadChange::Current(ts) => {
                metrics::WATCHER_HEAD.set(ts.epoch());
                self.cache.set_current(ts)
            }
            HeadChange::Apply(ts) => {
                metrics::WATCHER_HEAD.set(ts.epoch());
                match self.cache.add(ts.clone()) {
                    Ok(evicted) => evicted,
                    Err(tipset_cache::Error::AddOutOfOrder { epoch, head }) => {
                        warn!("applied height {epoch} is not above cached head {head}");
                        self.cache.set_current(ts)
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            HeadChange::Revert(ts) => {
                debug!("reverting height {}", ts.epoch());
                self.cache
                    .revert(&ts)
                    .with_context(|| format!("reverting height {}", ts.epoch()))?;
                None
            }
        };
        if let Some(ts) = confirmed {
            self.notify(ts).await?;
        }
        Ok(())
    }

    async fn notify(&self, ts: Arc<TipSet>) -> anyhow::Result<()> {
        debug!("height {} is confirmed", ts.epoch());
        self.obs.tip_set(ts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeChain;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ChainEpoch>>);

    #[async_trait]
    impl TipSetObserver for Recorder {
        async fn tip_set(&self, ts: Arc<TipSet>) -> anyhow::Result<()> {
            self.0.lock().push(ts.epoch());
            Ok(())
        }
    }

    fn setup(chain: FakeChain) -> (Arc<FakeChain>, Arc<DataSource>, Arc<Recorder>) {
        let chain = Arc::new(chain);
        let ds = Arc::new(DataSource::new(chain.clone()).unwrap());
        (chain, ds, Arc::new(Recorder::default()))
    }

    #[tokio::test]
    async fn walk_range() {
        let (_, ds, obs) = setup(FakeChain::linear(0..=10));
        Walker::new(ds.clone(), obs.clone(), 3, 7).run().await.unwrap();
        assert_eq!(*obs.0.lock(), vec![7, 6, 5, 4, 3]);

        let (_, ds, obs) = setup(FakeChain::linear(0..=4));
        Walker::new(ds, obs.clone(), 0, 100).run().await.unwrap();
        assert_eq!(*obs.0.lock(), vec![4, 3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn walk_skips_null_rounds() {
        let (_, ds, obs) = setup(FakeChain::linear([1, 2, 4, 5]));
        Walker::new(ds, obs.clone(), 1, 3).run().await.unwrap();
        assert_eq!(*obs.0.lock(), vec![2, 1]);
    }

    #[tokio::test]
    async fn walk_rejects_inverted_range() {
        let (_, ds, obs) = setup(FakeChain::linear([1]));
        assert!(Walker::new(ds, obs, 5, 1).run().await.is_err());
    }

    #[tokio::test]
    async fn watch_with_confidence() {
        let (chain, ds, obs) = setup(FakeChain::linear(1..=5));
        let notify = chain.notifier();
        let ts = |epoch| chain.tipset_at(epoch);
        notify.send(vec![HeadChange::Current(ts(1))]).unwrap();
        notify
            .send(vec![HeadChange::Apply(ts(2)), HeadChange::Apply(ts(3))])
            .unwrap();
        notify.send(vec![HeadChange::Apply(ts(4))]).unwrap();
        notify
            .send(vec![HeadChange::Revert(ts(4)), HeadChange::Apply(ts(4))])
            .unwrap();
        notify.send(vec![HeadChange::Apply(ts(5))]).unwrap();
        drop(notify);

        let mut watcher = Watcher::new(ds, obs.clone(), 2);
        watcher.run().await.unwrap();
        assert_eq!(*obs.0.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_confidence_passes_every_head() {
        let (chain, ds, obs) = setup(FakeChain::linear(1..=3));
        let notify = chain.notifier();
        for epoch in 1..=3 {
            notify
                .send(vec![HeadChange::Apply(chain.tipset_at(epoch))])
                .unwrap();
        }
        drop(notify);
        Watcher::new(ds, obs.clone(), 0).run().await.unwrap();
        assert_eq!(*obs.0.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn out_of_order_revert_fails() {
        let (chain, ds, obs) = setup(FakeChain::linear(1..=3));
        let notify = chain.notifier();
        notify
            .send(vec![
                HeadChange::Apply(chain.tipset_at(2)),
                HeadChange::Revert(chain.tipset_at(1)),
            ])
            .unwrap();
        drop(notify);
        assert!(Watcher::new(ds, obs, 2).run().await.is_err());
    }
}
