// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;

use crate::blocks::TipSet;
use crate::chain::{ChainNode, HeadChange};
use crate::shim::clock::ChainEpoch;

/// Deepest reorganization followed, the chain finality.
pub const MAX_REORG_DEPTH: ChainEpoch = 900;

/// The head changes moving the head from `from` to `to`: reverts from the
/// old head down to the common ancestor, then applies up to the new head.
pub async fn head_changes<N: ChainNode + ?Sized>(
    node: &N,
    from: Arc<TipSet>,
    to: Arc<TipSet>,
) -> anyhow::Result<Vec<HeadChange>> {
    let mut reverts = vec![];
    let mut applies = vec![];
    let (mut left, mut right) = (from, to);
    while left.key() != right.key() {
        anyhow::ensure!(
            (reverts.len() as ChainEpoch) < MAX_REORG_DEPTH
                && (applies.len() as ChainEpoch) < MAX_REORG_DEPTH,
            "no common ancestor of {} and {} within {MAX_REORG_DEPTH} tipsets",
            left.key(),
            right.key()
        );
        let (step_left, step_right) = (
            left.epoch() >= right.epoch(),
            right.epoch() >= left.epoch(),
        );
        if step_left {
            let parent = node.chain_get_tipset(left.parents()).await?;
            reverts.push(HeadChange::Revert(std::mem::replace(&mut left, parent)));
        }
        if step_right {
            let parent = node.chain_get_tipset(right.parents()).await?;
            applies.push(HeadChange::Apply(std::mem::replace(&mut right, parent)));
        }
    }
    applies.reverse();
    reverts.extend(applies);
    Ok(reverts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::TipSetKey;
    use crate::test_utils::{FakeChain, header};
    use crate::utils::encoding::cbor_cid;
    use pretty_assertions::assert_eq;

    fn epochs(changes: &[HeadChange]) -> Vec<(&'static str, ChainEpoch)> {
        changes
            .iter()
            .map(|change| match change {
                HeadChange::Current(ts) => ("current", ts.epoch()),
                HeadChange::Apply(ts) => ("apply", ts.epoch()),
                HeadChange::Revert(ts) => ("revert", ts.epoch()),
            })
            .collect()
    }

    fn fork(parent: &TipSet, epoch: ChainEpoch) -> Arc<TipSet> {
        Arc::new(
            TipSet::new(vec![header(
                epoch,
                parent.key().clone(),
                cbor_cid(b"fork"),
                2000,
            )])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn extension_applies_every_new_tipset() {
        let chain = FakeChain::linear(1..=5);
        let changes = head_changes(&chain, chain.tipset_at(2), chain.tipset_at(5))
            .await
            .unwrap();
        assert_eq!(
            epochs(&changes),
            vec![("apply", 3), ("apply", 4), ("apply", 5)]
        );
    }

    #[tokio::test]
    async fn reorg_reverts_to_the_common_ancestor() {
        let chain = FakeChain::linear(1..=5);
        // tipsets at 4 and 6 on top of 2, with null rounds at 3 and 5
        let a = fork(&chain.tipset_at(2), 4);
        let b = fork(&a, 6);
        chain.insert_fork(a);
        chain.insert_fork(b.clone());

        let changes = head_changes(&chain, chain.tipset_at(5), b).await.unwrap();
        assert_eq!(
            epochs(&changes),
            vec![
                ("revert", 5),
                ("revert", 4),
                ("revert", 3),
                ("apply", 4),
                ("apply", 6),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_ancestry_fails() {
        let chain = FakeChain::linear(1..=3);
        let stray = Arc::new(
            TipSet::new(vec![header(
                3,
                TipSetKey::new(vec![cbor_cid(b"unknown")]),
                cbor_cid(b"stray"),
                7,
            )])
            .unwrap(),
        );
        assert!(head_changes(&chain, chain.tipset_at(3), stray).await.is_err());
    }
}
